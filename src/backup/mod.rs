pub mod archive;
pub mod backup_config;
pub mod backup_type;
pub mod check;
pub mod file_util;
pub mod pipeline;
pub mod process;
pub mod redacted;
pub mod result_error;
pub mod schedule;
pub mod snapshot;
pub mod upload;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
