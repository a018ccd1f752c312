//! Selective region blur compositor.
//!
//! Holds user-drawn blur rectangles over a video frame, box-blurs the
//! frame pixels under each one and composites the result on a transparent
//! overlay that tracks the frame's size.

pub mod blurring {
    pub mod domain {
        pub mod region_blurrer;
    }
    pub mod infrastructure;
}

pub mod compositing {
    pub mod domain {
        pub mod frame_navigator;
        pub mod frame_surface;
        pub mod render_logger;
    }
    pub mod infrastructure;
    pub mod overlay;
    pub mod region_compositor;
}

pub mod shared {
    pub mod blur_region;
    pub mod constants;
    pub mod pixel_buffer;
    pub mod settings;
    pub mod snapshot;
}
