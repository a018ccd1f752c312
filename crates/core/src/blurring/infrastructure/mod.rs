pub mod box_blur;
pub mod cpu_box_blurrer;
