pub mod label_io;
pub mod nifti_io;
pub mod transform_io;

pub use label_io::{mask_extent, read_labels, write_labels};
pub use nifti_io::{read_geometry, read_nifti, read_volume, write_nifti, write_volume};
pub use transform_io::{
    read_displacement_components, read_displacement_field, read_itk_affine, write_displacement_components,
    write_displacement_field, write_itk_affine,
};
