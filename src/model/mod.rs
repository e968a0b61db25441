pub mod entry;
pub mod mod_info;
