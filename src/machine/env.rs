//! Cached environment-variable switches for debugging runs.

/// Cached env-var flag: true when the variable is set at all.
macro_rules! env_bool {
    ($name:ident, $var:expr) => {
        #[inline]
        pub(crate) fn $name() -> bool {
            use std::sync::OnceLock;
            static V: OnceLock<bool> = OnceLock::new();
            *V.get_or_init(|| std::env::var($var).is_ok())
        }
    };
}

env_bool!(disable_agc, "SANO_DISABLE_AGC");

/// Force the render mode (0-3), overriding the CPLD2 register. Hex digit.
pub(crate) fn force_video_mode() -> Option<u8> {
    use std::sync::OnceLock;
    static V: OnceLock<Option<u8>> = OnceLock::new();
    *V.get_or_init(|| {
        std::env::var("SANO_FORCE_VIDEO_MODE")
            .ok()
            .and_then(|s| u8::from_str_radix(&s, 16).ok())
            .map(|mode| mode & 0x03)
    })
}

/// Master volume override, 0.0-1.0.
pub(crate) fn master_volume() -> Option<f32> {
    use std::sync::OnceLock;
    static V: OnceLock<Option<f32>> = OnceLock::new();
    *V.get_or_init(|| {
        std::env::var("SANO_MASTER_VOLUME")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .filter(|v| (0.0..=1.0).contains(v))
    })
}
