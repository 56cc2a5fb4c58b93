//! Capability probe

use tracing::warn;

use crate::context::AudioContext;
use crate::event::FallbackReason;

/// What a context can do for the suppression stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub modules_supported: bool,
    pub sample_rate: u32,
    pub required_rate: u32,
}

impl Capability {
    pub fn rate_matches(&self) -> bool {
        self.sample_rate == self.required_rate
    }

    /// Whether the suppression stage can run at all.
    pub fn can_process(&self) -> bool {
        self.modules_supported && self.rate_matches()
    }

    /// The first check that failed, if any.
    pub fn missing(&self) -> Option<FallbackReason> {
        if !self.modules_supported {
            Some(FallbackReason::ModulesUnsupported)
        } else if !self.rate_matches() {
            Some(FallbackReason::SampleRateMismatch {
                actual: self.sample_rate,
                required: self.required_rate,
            })
        } else {
            None
        }
    }
}

/// Check `ctx` against what the suppressor needs. Warns about every failed check.
pub fn probe(ctx: &AudioContext, required_rate: u32) -> Capability {
    let cap = Capability {
        modules_supported: ctx.supports_modules(),
        sample_rate: ctx.sample_rate(),
        required_rate,
    };

    if !cap.modules_supported {
        warn!(context = ctx.id(), "processing modules are not supported; suppression unavailable");
    }
    if !cap.rate_matches() {
        warn!(
            context = ctx.id(),
            sample_rate = cap.sample_rate,
            required = cap.required_rate,
            "sample rate mismatch; suppression unavailable"
        );
    }
    cap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;

    #[test]
    fn full_support() {
        let mut host = MockHost::new();
        let ctx = AudioContext::new(&mut host, 48_000).unwrap();
        let cap = probe(&ctx, 48_000);
        assert!(cap.can_process());
        assert_eq!(cap.missing(), None);
    }

    #[test]
    fn rate_mismatch() {
        let mut host = MockHost::new().with_output_rate(44_100);
        let ctx = AudioContext::new(&mut host, 48_000).unwrap();
        let cap = probe(&ctx, 48_000);
        assert!(cap.modules_supported);
        assert!(!cap.can_process());
        assert_eq!(
            cap.missing(),
            Some(FallbackReason::SampleRateMismatch { actual: 44_100, required: 48_000 })
        );
    }

    #[test]
    fn no_modules() {
        let mut host = MockHost::new().without_processing_modules();
        let ctx = AudioContext::new(&mut host, 48_000).unwrap();
        assert_eq!(probe(&ctx, 48_000).missing(), Some(FallbackReason::ModulesUnsupported));
    }
}
