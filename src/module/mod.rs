//! Processing modules.
//!
//! A module is a pre-built bundle of processors. Loading one into an
//! [`AudioContext`](crate::AudioContext) registers its processors by name; after
//! that, [`AudioContext::create_processor`](crate::AudioContext::create_processor)
//! instantiates them as graph nodes. The context treats every processor as a
//! black-box frame transform.
//!
//! To add a new backend, implement [`FrameProcessor`] and a [`ProcessorModule`]
//! that defines it.

mod rnnoise;

pub use rnnoise::{RnnoiseModule, RnnoiseSuppressor, RNNOISE_MODULE_ID};

use hashbrown::HashMap;

use crate::config::ProcessorOptions;
use crate::error::{Error, Result};

/// A mono, fixed-frame audio transform.
///
/// Samples are normalized f32 (`[-1.0, 1.0]`).
pub trait FrameProcessor: Send + 'static {
    /// Number of samples per processing frame.
    fn frame_size(&self) -> usize;

    /// Process one frame.
    /// `input` and `output` both have exactly `frame_size()` samples.
    fn process_frame(&mut self, input: &[f32], output: &mut [f32]);

    /// Forget any state carried between frames.
    fn reset(&mut self) {}
}

/// Builds a processor from its options.
pub type ProcessorFactory =
    Box<dyn Fn(&ProcessorOptions) -> Result<Box<dyn FrameProcessor>> + Send + Sync>;

/// A loadable bundle of processor definitions.
pub trait ProcessorModule: Send + Sync {
    /// Identifier the module is loaded by. Loading the same id twice is an error.
    fn id(&self) -> &str;

    /// Define this module's processors.
    fn register(&self, registry: &mut ProcessorRegistry) -> Result<()>;
}

/// Processor definitions known to one context.
#[derive(Default)]
pub struct ProcessorRegistry {
    modules: Vec<String>,
    processors: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a processor under `name`.
    pub fn define<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&ProcessorOptions) -> Result<Box<dyn FrameProcessor>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.processors.contains_key(&name) {
            return Err(Error::registration(name, "processor name already defined"));
        }
        self.processors.insert(name, Box::new(factory));
        Ok(())
    }

    /// Load a module. Nothing is defined if the module fails part way.
    pub fn load(&mut self, module: &dyn ProcessorModule) -> Result<()> {
        let id = module.id().to_string();
        if self.is_loaded(&id) {
            return Err(Error::ModuleAlreadyRegistered(id));
        }

        let mut staged = ProcessorRegistry::new();
        module.register(&mut staged)?;

        for name in staged.processors.keys() {
            if self.processors.contains_key(name) {
                return Err(Error::registration(
                    id,
                    format!("processor '{}' is already defined by another module", name),
                ));
            }
        }
        self.processors.extend(staged.processors);
        self.modules.push(id);
        Ok(())
    }

    pub fn is_loaded(&self, module_id: &str) -> bool {
        self.modules.iter().any(|m| m == module_id)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Ids of every loaded module, in load order.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Create a processor instance.
    pub fn instantiate(&self, name: &str, options: &ProcessorOptions) -> Result<Box<dyn FrameProcessor>> {
        let factory = self
            .processors
            .get(name)
            .ok_or_else(|| Error::UnknownProcessor(name.to_string()))?;
        factory(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl FrameProcessor for Passthrough {
        fn frame_size(&self) -> usize { 4 }

        fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
            output.copy_from_slice(input);
        }
    }

    struct TwoProcessors;

    impl ProcessorModule for TwoProcessors {
        fn id(&self) -> &str { "two" }

        fn register(&self, registry: &mut ProcessorRegistry) -> Result<()> {
            registry.define("a", |_: &ProcessorOptions| Ok(Box::new(Passthrough) as Box<dyn FrameProcessor>))?;
            registry.define("b", |_: &ProcessorOptions| Ok(Box::new(Passthrough) as Box<dyn FrameProcessor>))
        }
    }

    struct Broken;

    impl ProcessorModule for Broken {
        fn id(&self) -> &str { "broken" }

        fn register(&self, registry: &mut ProcessorRegistry) -> Result<()> {
            registry.define("c", |_: &ProcessorOptions| Ok(Box::new(Passthrough) as Box<dyn FrameProcessor>))?;
            Err(Error::registration("broken", "bad bytecode"))
        }
    }

    #[test]
    fn loads_once() {
        let mut reg = ProcessorRegistry::new();
        reg.load(&TwoProcessors).unwrap();
        assert!(reg.is_loaded("two"));
        assert!(reg.is_defined("a") && reg.is_defined("b"));

        assert!(matches!(reg.load(&TwoProcessors), Err(Error::ModuleAlreadyRegistered(id)) if id == "two"));
        assert_eq!(reg.modules(), ["two".to_string()]);
    }

    #[test]
    fn failed_module_defines_nothing() {
        let mut reg = ProcessorRegistry::new();
        assert!(reg.load(&Broken).is_err());
        assert!(!reg.is_loaded("broken"));
        assert!(!reg.is_defined("c"));
    }

    #[test]
    fn unknown_processor() {
        let reg = ProcessorRegistry::new();
        let err = reg.instantiate("nope", &ProcessorOptions::default()).err().unwrap();
        assert!(matches!(err, Error::UnknownProcessor(name) if name == "nope"));
    }
}
