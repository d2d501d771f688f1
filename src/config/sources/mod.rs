pub mod explicit_file;
pub mod system_file;
