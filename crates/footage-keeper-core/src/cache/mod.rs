pub mod folder_size;

pub use folder_size::{FolderSizeCache, FolderSizeEntry, SizeLookup, SizeSource};
