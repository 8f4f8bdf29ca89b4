use crate::cpld1::{Cpld1Audio, AUDIO_CHANNELS};

/// Smoothing factor for gain changes, per frame.
const AGC_ALPHA: f32 = 0.01;

#[derive(Clone, Copy)]
struct Channel {
    volume: f32,
    /// -1.0 = full left, 0.0 = center, +1.0 = full right.
    pan: f32,
    muted: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            muted: false,
        }
    }
}

/// Eight-channel volume/pan mixer producing interleaved stereo `i16` at the
/// 32 kHz sample clock, with optional automatic gain control.
///
/// Panning is a straight linear crossfade, not equal-power: the center
/// position passes both sides at unity, matching the console's DSP.
pub struct AudioMixer {
    channels: [Channel; AUDIO_CHANNELS],
    master_volume: f32,
    auto_gain: bool,
    current_gain: f32,
    target_gain: f32,
}

impl AudioMixer {
    pub fn new() -> Self {
        Self {
            channels: [Channel::default(); AUDIO_CHANNELS],
            master_volume: 1.0,
            auto_gain: true,
            current_gain: 1.0,
            target_gain: 1.0,
        }
    }

    /// Reset channel state and gain tracking. The AGC switch and master
    /// volume are host-level settings and survive a console reset.
    pub fn reset(&mut self) {
        *self = Self {
            auto_gain: self.auto_gain,
            master_volume: self.master_volume,
            ..Self::new()
        };
    }

    pub fn set_channel_volume(&mut self, channel: usize, volume: f32) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn set_channel_pan(&mut self, channel: usize, pan: f32) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.pan = pan.clamp(-1.0, 1.0);
        }
    }

    pub fn set_channel_mute(&mut self, channel: usize, muted: bool) {
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.muted = muted;
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_auto_gain(&mut self, enabled: bool) {
        self.auto_gain = enabled;
        if enabled {
            self.current_gain = 1.0;
            self.target_gain = 1.0;
        }
    }

    pub fn current_gain(&self) -> f32 {
        self.current_gain
    }

    /// Mix one stereo frame from the per-channel FIFO front samples.
    pub fn mix_frame(&mut self, inputs: [i16; AUDIO_CHANNELS]) -> (i16, i16) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;

        for (channel, &input) in self.channels.iter().zip(inputs.iter()) {
            if channel.muted {
                continue;
            }
            let sample = input as f32 * channel.volume;
            let (left_gain, right_gain) = if channel.pan <= 0.0 {
                (1.0, 1.0 + channel.pan)
            } else {
                (1.0 - channel.pan, 1.0)
            };
            left += sample * left_gain;
            right += sample * right_gain;
        }

        left *= self.master_volume;
        right *= self.master_volume;

        if self.auto_gain {
            // Peak detection on the pre-clamp signal; gain recovers toward
            // unity while the signal is in range.
            let peak = left.abs().max(right.abs());
            self.target_gain = if peak > 32767.0 { 32767.0 / peak } else { 1.0 };
            self.current_gain += (self.target_gain - self.current_gain) * AGC_ALPHA;
            left *= self.current_gain;
            right *= self.current_gain;
        }

        (clamp_sample(left), clamp_sample(right))
    }

    /// Fill `out` (interleaved stereo) from the CPLD FIFO fronts, draining
    /// one sample per channel per frame. Returns whether the serializer's
    /// low-watermark IRQ fired during the span.
    pub fn generate_samples(&mut self, cpld1: &mut Cpld1Audio, out: &mut [i16]) -> bool {
        let mut irq = false;
        for frame in out.chunks_exact_mut(2) {
            let (left, right) = self.mix_frame(cpld1.channel_frame());
            frame[0] = left;
            frame[1] = right;
            irq |= cpld1.tick();
        }
        irq
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_sample(sample: f32) -> i16 {
    sample.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
