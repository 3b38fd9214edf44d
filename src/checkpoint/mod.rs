mod pointer;

pub use pointer::{
    global_step_from_path, latest_checkpoint, record_file, write_checkpoint_pointer,
    CheckpointPointer, DIR_RECORD_FILE, LATEST_LINK, POINTER_FILE,
};
