//! Screen-capture frame acquisition is an external collaborator, out of
//! scope here -- the color space conversion to NV12 is assumed done
//! upstream, on the GPU capture path, before a frame ever reaches this
//! boundary. `FrameSource` is the trait the capture-feed thread pulls
//! from; a host application supplies the concrete implementation (screen
//! capture API, test fixture, etc).

pub struct RawFrame {
    pub plane_y: Vec<u8>,
    pub plane_uv: Vec<u8>,
    pub linesize_y: usize,
    pub linesize_uv: usize,
    /// 100-ns units from capture start.
    pub timestamp: i64,
}

/// Blocking pull of the next NV12 frame. Returning `None` signals the
/// source is exhausted or has been told to stop; the capture-feed thread
/// treats that as a clean end, not an error.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<RawFrame>;
}
