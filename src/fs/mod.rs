pub mod read;
pub mod task;
pub mod write;

pub use read::{checksum_file, read_symlink_target, read_xattrs};
pub use task::{spawn_checksum, ChecksumTask};
pub use write::{
    create_temp_dir, fsync_dir, materialize, materialize_with_unique_name,
    materialize_with_unique_name_using, NameSource, UuidNames, DEFAULT_FILE_MODE,
    MAX_NAME_ATTEMPTS,
};
