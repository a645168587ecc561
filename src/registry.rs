//! Encoder variants and the registry that creates elements from them.
//!
//! Every codec an engine can encode becomes one [`EncoderVariant`]: a static
//! record with the element name (`avenc_<codec>`), pad templates, and the
//! per-variant [`CapabilityCache`]. Pseudo-codecs (raw video, zlib, PCM),
//! decode-only codecs, and codecs without a caps mapping get no variant.
//!
//! The [`EncoderRegistry`] is an explicit, ordered list of variants owned by
//! the application; there is no process-wide table.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use avenc::engine::testing::ScriptedFactory;
//! use avenc::engine::{CodecDescriptor, CodecId};
//! use avenc::format::{AudioCodec, VideoCodec};
//! use avenc::registry::EncoderRegistry;
//!
//! let mut registry = EncoderRegistry::new();
//! assert!(registry.register(Arc::new(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4))));
//! assert!(registry.register(Arc::new(ScriptedFactory::audio("mp2", AudioCodec::Mp2))));
//! let raw = CodecDescriptor::new("rawvideo", CodecId::RawVideo);
//! assert!(!registry.register(Arc::new(ScriptedFactory::new(raw))));
//!
//! assert_eq!(registry.names(), vec!["avenc_mpeg4", "avenc_mp2"]);
//! let encoder = registry.make("avenc_mp2").unwrap();
//! assert_eq!(encoder.name(), "avenc_mp2");
//! ```

use std::sync::Arc;

use crate::codecmap;
use crate::config::PropertyValue;
use crate::element::{EncoderElement, PadTemplate};
use crate::engine::{CodecDescriptor, EngineFactory};
use crate::error::{Error, Result};
use crate::format::{Caps, MediaKind};
use crate::negotiation::{CapabilityCache, FormatProbe};

/// Prefix of every encoder element name.
pub const ELEMENT_PREFIX: &str = "avenc_";

/// Static configuration of one encoder element type.
pub struct EncoderVariant {
    element_name: String,
    long_name: String,
    klass: &'static str,
    description: String,
    factory: Arc<dyn EngineFactory>,
    sink_template: Arc<PadTemplate>,
    src_template: Arc<PadTemplate>,
    cache: CapabilityCache,
}

impl EncoderVariant {
    /// Build the variant for an engine factory.
    ///
    /// Returns `None` for pseudo-codecs, decode-only codecs and codecs
    /// without a caps mapping.
    pub fn from_factory(factory: Arc<dyn EngineFactory>) -> Option<Self> {
        let codec = factory.descriptor();
        if !codec.can_encode || codec.id.is_quasi() {
            tracing::trace!(codec = %codec.name, "skipping codec");
            return None;
        }

        let Some(src_caps) = codecmap::codec_to_caps(codec.id, None) else {
            tracing::warn!(codec = %codec.name, "no caps mapping for codec, not registering");
            return None;
        };

        let kind = codec.kind();
        let klass = match kind {
            MediaKind::Video => "Codec/Encoder/Video",
            MediaKind::Audio => "Codec/Encoder/Audio",
        };

        Some(Self {
            element_name: format!("{ELEMENT_PREFIX}{}", codec.name),
            long_name: format!("{} encoder", codec.long_name),
            klass,
            description: format!("Encodes raw {kind} as {}", codec.long_name),
            sink_template: Arc::new(PadTemplate::sink(codecmap::template_sink_caps(kind))),
            src_template: Arc::new(PadTemplate::src(src_caps)),
            cache: CapabilityCache::new(),
            factory,
        })
    }

    /// Element type name, `avenc_<codec>`.
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    /// Human-readable name.
    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// Classification string.
    pub fn klass(&self) -> &'static str {
        self.klass
    }

    /// One-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The wrapped codec.
    pub fn codec(&self) -> &CodecDescriptor {
        self.factory.descriptor()
    }

    /// Factory for engine instances.
    pub fn factory(&self) -> &Arc<dyn EngineFactory> {
        &self.factory
    }

    /// Template of the `sink` pad.
    pub fn sink_template(&self) -> &Arc<PadTemplate> {
        &self.sink_template
    }

    /// Template of the `src` pad.
    pub fn src_template(&self) -> &Arc<PadTemplate> {
        &self.src_template
    }

    /// The capability cache.
    pub fn cache(&self) -> &CapabilityCache {
        &self.cache
    }

    /// Accepted input formats, probing the engine on first use.
    pub fn sink_caps(&self) -> &Caps {
        self.cache
            .get_or_probe(&FormatProbe::new(self.factory.as_ref()), &self.sink_template.caps)
    }
}

impl std::fmt::Debug for EncoderVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderVariant")
            .field("element_name", &self.element_name)
            .field("klass", &self.klass)
            .field("codec", &self.codec().id)
            .field("probed", &self.cache.is_populated())
            .finish_non_exhaustive()
    }
}

/// Ordered list of encoder variants.
#[derive(Debug, Default)]
pub struct EncoderRegistry {
    variants: Vec<Arc<EncoderVariant>>,
}

impl EncoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every encoder the linked FFmpeg build provides.
    #[cfg(feature = "ffmpeg")]
    pub fn with_ffmpeg() -> Result<Self> {
        let mut registry = Self::new();
        for factory in crate::engine::ffmpeg::encoder_factories()? {
            registry.register(factory);
        }
        tracing::info!(variants = registry.len(), "registered ffmpeg encoders");
        Ok(registry)
    }

    /// Add a variant for `factory`.
    ///
    /// Returns `false` when the codec gets no variant or the element name is
    /// already taken.
    pub fn register(&mut self, factory: Arc<dyn EngineFactory>) -> bool {
        let Some(variant) = EncoderVariant::from_factory(factory) else {
            return false;
        };
        if self.get(variant.element_name()).is_some() {
            tracing::debug!(element = variant.element_name(), "duplicate encoder, skipping");
            return false;
        }
        tracing::debug!(
            element = variant.element_name(),
            klass = variant.klass(),
            "registered encoder"
        );
        self.variants.push(Arc::new(variant));
        true
    }

    /// Look up a variant by element name.
    pub fn get(&self, element_name: &str) -> Option<&Arc<EncoderVariant>> {
        self.variants
            .iter()
            .find(|v| v.element_name() == element_name)
    }

    /// Element names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.element_name()).collect()
    }

    /// Every variant, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EncoderVariant>> {
        self.variants.iter()
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Whether no variant is registered.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Create an element by name.
    pub fn make(&self, element_name: &str) -> Result<EncoderElement> {
        let variant = self
            .get(element_name)
            .ok_or_else(|| Error::Config(format!("no encoder named '{element_name}'")))?;
        Ok(EncoderElement::new(Arc::clone(variant)))
    }

    /// Create an element by name and apply properties in order.
    pub fn make_with_properties<'a>(
        &self,
        element_name: &str,
        properties: impl IntoIterator<Item = (&'a str, PropertyValue)>,
    ) -> Result<EncoderElement> {
        let mut element = self.make(element_name)?;
        for (name, value) in properties {
            element.set_property(name, &value)?;
        }
        Ok(element)
    }
}
