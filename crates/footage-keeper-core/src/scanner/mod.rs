pub mod walk;

pub use walk::{discover_folders, list_entry_names, list_videos, scan_folder, Discovery};
