pub mod image_file_reader;
pub mod image_file_writer;
pub mod image_sequence_navigator;
pub mod shared_frame_surface;
