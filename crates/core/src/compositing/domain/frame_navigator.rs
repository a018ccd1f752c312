/// Capability interface for whatever drives frame playback.
///
/// Implementors own stepping, speed and looping; after any seek the host
/// notifies the compositor that the frame changed.
pub trait FrameNavigator {
    fn seek_to_frame(&mut self, frame_number: usize) -> Result<(), Box<dyn std::error::Error>>;

    fn total_frames(&self) -> usize;

    fn frame_rate(&self) -> f64;
}
