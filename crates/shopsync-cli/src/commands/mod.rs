pub mod common;
pub mod completions;
pub mod import;
pub mod inspect;
pub mod jobs;
pub mod map;
pub mod work;
