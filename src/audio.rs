//! Sound bookkeeping over a pluggable playback backend.
//!
//! Sounds can be fetched before the platform allows an audio context to exist.
//! Raw bytes are kept until `initialize` hands over a backend; the shell then
//! decodes them and calls `set_decoded`.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::AudioError;

pub trait AudioBackend {
    type Buffer;
    type Voice;

    fn play(&mut self, buffer: &Self::Buffer, volume: f32, rate: f32, looping: bool) -> Result<Self::Voice, AudioError>;
    fn set_volume(&mut self, voice: &Self::Voice, volume: f32);
    fn stop(&mut self, voice: Self::Voice);
}

/// Backend that accepts everything and plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBackend;

impl AudioBackend for SilentBackend {
    type Buffer = ();
    type Voice = ();

    fn play(&mut self, _buffer: &(), _volume: f32, _rate: f32, _looping: bool) -> Result<(), AudioError> {
        Ok(())
    }

    fn set_volume(&mut self, _voice: &(), _volume: f32) {}

    fn stop(&mut self, _voice: ()) {}
}

struct Sound<Buf> {
    raw: Vec<u8>,
    decoded: Option<Buf>,
}

struct Loop<V> {
    voice: V,
    volume: f32,
}

pub struct AudioManager<B: AudioBackend> {
    backend: Option<B>,
    sounds: HashMap<String, Sound<B::Buffer>>,
    loops: HashMap<String, Loop<B::Voice>>,
    muted: bool,
    ambience: Option<String>,
}

impl<B: AudioBackend> AudioManager<B> {
    pub fn new(muted: bool) -> Self {
        Self {
            backend: None,
            sounds: HashMap::new(),
            loops: HashMap::new(),
            muted,
            ambience: None,
        }
    }

    /// Install the backend. Only the first call has an effect; returns whether
    /// this call initialized the manager.
    pub fn initialize(&mut self, backend: B) -> bool {
        if self.backend.is_some() {
            return false;
        }
        self.backend = Some(backend);
        info!(pending = self.pending_decodes().len(), "audio initialized");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Store fetched bytes. Replaces an earlier sound of the same name.
    pub fn store_raw(&mut self, name: &str, raw: Vec<u8>) {
        debug!(name, bytes = raw.len(), "sound fetched");
        self.sounds.insert(name.to_string(), Sound { raw, decoded: None });
    }

    /// Names and bytes of sounds still waiting for a decode.
    pub fn pending_decodes(&self) -> Vec<(String, Vec<u8>)> {
        self.sounds
            .iter()
            .filter(|(_, s)| s.decoded.is_none())
            .map(|(name, s)| (name.clone(), s.raw.clone()))
            .collect()
    }

    pub fn set_decoded(&mut self, name: &str, buffer: B::Buffer) {
        match self.sounds.get_mut(name) {
            Some(sound) => sound.decoded = Some(buffer),
            None => warn!("decoded sound {name} was never loaded"),
        }
    }

    pub fn is_decoded(&self, name: &str) -> bool {
        self.sounds.get(name).is_some_and(|s| s.decoded.is_some())
    }

    fn ready(&mut self, name: &str) -> Result<(&mut B, &B::Buffer), AudioError> {
        let backend = self.backend.as_mut().ok_or(AudioError::NotInitialized)?;
        let sound = self
            .sounds
            .get(name)
            .ok_or_else(|| AudioError::UnknownSound(name.to_string()))?;
        let buffer = sound
            .decoded
            .as_ref()
            .ok_or_else(|| AudioError::NotDecoded(name.to_string()))?;
        Ok((backend, buffer))
    }

    /// Fire and forget. Returns `Ok(false)` when muted.
    pub fn play_one_shot(&mut self, name: &str, volume: f32, rate: f32) -> Result<bool, AudioError> {
        let muted = self.muted;
        let (backend, buffer) = self.ready(name)?;
        if muted {
            return Ok(false);
        }
        backend.play(buffer, volume, rate, false)?;
        Ok(true)
    }

    /// Start a named loop unless it is already running. A loop started while
    /// muted plays silently and picks up `volume` on unmute.
    pub fn play_loop(&mut self, name: &str, volume: f32) -> Result<bool, AudioError> {
        if self.loops.contains_key(name) {
            return Ok(false);
        }
        let muted = self.muted;
        let (backend, buffer) = self.ready(name)?;
        let voice = backend.play(buffer, if muted { 0.0 } else { volume }, 1.0, true)?;
        self.loops.insert(name.to_string(), Loop { voice, volume });
        debug!(name, volume, muted, "loop started");
        Ok(true)
    }

    pub fn stop_loop(&mut self, name: &str) {
        let Some(looped) = self.loops.remove(name) else {
            return;
        };
        if let Some(backend) = self.backend.as_mut() {
            backend.stop(looped.voice);
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if let Some(backend) = self.backend.as_mut() {
            for looped in self.loops.values() {
                backend.set_volume(&looped.voice, if muted { 0.0 } else { looped.volume });
            }
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_looping(&self, name: &str) -> bool {
        self.loops.contains_key(name)
    }

    /// Switch the ambience track, stopping the previous one.
    pub fn start_ambience(&mut self, name: &str, volume: f32) -> Result<(), AudioError> {
        if self.ambience.as_deref() != Some(name) {
            self.stop_ambience();
        }
        self.play_loop(name, volume)?;
        self.ambience = Some(name.to_string());
        Ok(())
    }

    pub fn stop_ambience(&mut self) {
        if let Some(name) = self.ambience.take() {
            self.stop_loop(&name);
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub mod web {
    use js_sys::Uint8Array;
    use tracing::debug;
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{AudioBuffer, AudioBufferSourceNode, AudioContext, AudioContextState, AudioScheduledSourceNode, GainNode};

    use super::AudioBackend;
    use crate::error::AudioError;

    fn js_err(e: JsValue) -> AudioError {
        AudioError::Backend(format!("{e:?}"))
    }

    pub struct WebVoice {
        source: AudioBufferSourceNode,
        gain: GainNode,
    }

    pub struct WebAudioBackend {
        ctx: AudioContext,
    }

    impl WebAudioBackend {
        pub fn new() -> Result<Self, AudioError> {
            AudioContext::new().map(|ctx| Self { ctx }).map_err(js_err)
        }

        pub fn context(&self) -> AudioContext {
            self.ctx.clone()
        }
    }

    /// Resume a context suspended by autoplay policy.
    pub async fn resume(ctx: &AudioContext) -> Result<(), AudioError> {
        if ctx.state() == AudioContextState::Suspended {
            JsFuture::from(ctx.resume().map_err(js_err)?).await.map_err(js_err)?;
        }
        Ok(())
    }

    pub async fn decode(ctx: &AudioContext, bytes: &[u8]) -> Result<AudioBuffer, AudioError> {
        // decodeAudioData detaches its input, so always hand it a fresh copy.
        let array = Uint8Array::from(bytes);
        let promise = ctx.decode_audio_data(&array.buffer()).map_err(js_err)?;
        JsFuture::from(promise)
            .await
            .map_err(js_err)?
            .dyn_into::<AudioBuffer>()
            .map_err(js_err)
    }

    impl AudioBackend for WebAudioBackend {
        type Buffer = AudioBuffer;
        type Voice = WebVoice;

        fn play(&mut self, buffer: &AudioBuffer, volume: f32, rate: f32, looping: bool) -> Result<WebVoice, AudioError> {
            let source = self.ctx.create_buffer_source().map_err(js_err)?;
            let gain = self.ctx.create_gain().map_err(js_err)?;
            source.set_buffer(Some(buffer));
            source.set_loop(looping);
            source.playback_rate().set_value(rate);
            gain.gain().set_value(volume);
            source.connect_with_audio_node(&gain).map_err(js_err)?;
            gain.connect_with_audio_node(&self.ctx.destination()).map_err(js_err)?;
            let scheduled: &AudioScheduledSourceNode = &source;
            scheduled.start().map_err(js_err)?;
            Ok(WebVoice { source, gain })
        }

        fn set_volume(&mut self, voice: &WebVoice, volume: f32) {
            voice.gain.gain().set_value(volume);
        }

        fn stop(&mut self, voice: WebVoice) {
            let scheduled: &AudioScheduledSourceNode = &voice.source;
            if let Err(e) = scheduled.stop() {
                debug!("audio source already stopped: {e:?}");
            }
            if let Err(e) = voice.source.disconnect() {
                debug!("audio source disconnect failed: {e:?}");
            }
            if let Err(e) = voice.gain.disconnect() {
                debug!("audio gain disconnect failed: {e:?}");
            }
        }
    }
}
