//! Collection components: capture dates, folder scan, collection naming.

pub mod capture_date;
pub mod file_system;
pub mod scan;

pub use capture_date::{
    CaptureDateSource, ExifDateSource, capture_keys, now_keys, parse_exif_datetime,
};
pub use file_system::{CollectionFileSystem, collection_folder_name};
pub use scan::{ScanOptions, collect_image_files, is_recognized, list_candidates, target_extension};
