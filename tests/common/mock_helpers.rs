//! Mock construction helpers

use chromaflow::pipeline::nodes::PIXEL_DATA;
use chromaflow::pipeline::{
    Connector, ContextProducer, ContextRequest, FilterCore, FilterModule, PipelineResult,
    PixelTicket, RunContext, Runner, SignalEvent,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use mockall::mock;

mock! {
    pub Producer {}

    impl ContextProducer for Producer {
        fn produce(&self, request: &ContextRequest) -> anyhow::Result<Option<Vec<u8>>>;
    }
}

/// One-plug, one-socket core whose context comes from a mock producer
pub struct MockedCore {
    registration: String,
    kind: String,
    producer: MockProducer,
}

impl MockedCore {
    pub fn new(registration: &str, kind: &str, producer: MockProducer) -> Self {
        Self {
            registration: registration.to_string(),
            kind: kind.to_string(),
            producer,
        }
    }
}

impl FilterCore for MockedCore {
    fn registration(&self) -> &str {
        &self.registration
    }

    fn plugs(&self) -> Vec<Connector> {
        vec![Connector::sink("in", "data/pixel")]
    }

    fn sockets(&self) -> Vec<Connector> {
        vec![Connector::source("out", PIXEL_DATA)]
    }

    fn context_type(&self) -> Option<&str> {
        Some(&self.kind)
    }

    fn producer(&self) -> Option<&dyn ContextProducer> {
        Some(&self.producer)
    }
}

/// Runner that pulls its input and leaves the pixels as they are
pub struct PassRunner;

impl Runner for PassRunner {
    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelTicket) -> PipelineResult<()> {
        ctx.pull(0, ticket)?;
        ctx.context()?;
        Ok(())
    }
}

/// Module with a mocked context producer and a pass-through runner
pub fn mocked_module(registration: &str, producer: MockProducer) -> FilterModule {
    FilterModule::new(MockedCore::new(registration, "mock", producer), PassRunner)
}

/// Channel pair for signal listeners
pub fn create_event_channel() -> (Sender<SignalEvent>, Receiver<SignalEvent>) {
    unbounded()
}
