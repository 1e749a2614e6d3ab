//! Requester and responder wired together for integration tests

use std::sync::Arc;

use butler_config::{RequesterConfig, ResponderConfig};
use butler_core::{BridgeEvent, EventBus, LocalBus, Subscription, transport};
use butler_requester::Requester;
use butler_responder::{Responder, ScriptedCapability};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Buffer size of the in-memory byte stream used for wire tests
const WIRE_BUFFER: usize = 64 * 1024;

/// A running bridge: one requester, one responder backed by a scripted capability
pub struct TestBridge {
    requester: Requester,
    responder: Arc<Responder>,
    capability: ScriptedCapability,
    host_bus: LocalBus,
    link: Option<CancellationToken>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TestBridge {
    /// Both halves share one in-process bus
    pub async fn local(capability: ScriptedCapability) -> anyhow::Result<Self> {
        Self::local_with(capability, &RequesterConfig::default()).await
    }

    pub async fn local_with(capability: ScriptedCapability, config: &RequesterConfig) -> anyhow::Result<Self> {
        let bus = LocalBus::new();
        let shutdown = CancellationToken::new();
        let mut ready = bus.subscribe()?;

        let responder = Arc::new(Responder::from_config(
            Arc::new(bus.clone()),
            Arc::new(capability.clone()),
            &ResponderConfig::default(),
        ));
        let tasks = vec![spawn_responder(&responder, &shutdown)];
        wait_for_ready(&mut ready).await?;

        Ok(Self {
            requester: Requester::from_config(Arc::new(bus.clone()), config),
            responder,
            capability,
            host_bus: bus,
            link: None,
            shutdown,
            tasks,
        })
    }

    /// Each half has its own bus, linked by the line-delimited JSON transport
    pub async fn over_wire(capability: ScriptedCapability) -> anyhow::Result<Self> {
        let host_bus = LocalBus::new();
        let page_bus = LocalBus::new();
        let shutdown = CancellationToken::new();
        let link = shutdown.child_token();
        let (host_io, page_io) = tokio::io::duplex(WIRE_BUFFER);
        let mut ready = host_bus.subscribe()?;

        let mut tasks = vec![
            spawn_pipe(host_bus.clone(), host_io, link.clone()),
            spawn_pipe(page_bus.clone(), page_io, link.clone()),
        ];
        while page_bus.listener_count() == 0 {
            tokio::task::yield_now().await;
        }

        let responder = Arc::new(Responder::new(Arc::new(page_bus), Arc::new(capability.clone())));
        tasks.push(spawn_responder(&responder, &shutdown));
        wait_for_ready(&mut ready).await?;

        Ok(Self {
            requester: Requester::new(Arc::new(host_bus.clone())),
            responder,
            capability,
            host_bus,
            link: Some(link),
            shutdown,
            tasks,
        })
    }

    /// Cut the wire between the two buses, leaving the responder running
    pub fn disconnect(&self) {
        if let Some(link) = &self.link {
            link.cancel();
        }
    }

    pub const fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    pub const fn capability(&self) -> &ScriptedCapability {
        &self.capability
    }

    /// Bus the requester publishes on
    pub const fn host_bus(&self) -> &LocalBus {
        &self.host_bus
    }

    /// Stop every task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.await.ok();
        }
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_responder(responder: &Arc<Responder>, shutdown: &CancellationToken) -> JoinHandle<()> {
    let responder = Arc::clone(responder);
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        responder.run(shutdown).await.ok();
    })
}

/// Run the transport, detaching `bus` once the wire is gone
fn spawn_pipe(bus: LocalBus, io: tokio::io::DuplexStream, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        transport::pipe(&bus, io, shutdown).await.ok();
        bus.detach();
    })
}

async fn wait_for_ready(subscription: &mut Subscription) -> anyhow::Result<()> {
    while let Some(event) = subscription.recv().await {
        if matches!(event, BridgeEvent::Ready(_)) {
            return Ok(());
        }
    }
    anyhow::bail!("bus closed before the responder announced readiness")
}

/// Collect every response event queued on `subscription` so far
pub fn drain_responses(subscription: &mut Subscription) -> Vec<butler_core::ResponseEvent> {
    std::iter::from_fn(|| subscription.try_recv())
        .filter_map(|event| match event {
            BridgeEvent::Response(response) => Some(response),
            _ => None,
        })
        .collect()
}

/// Subscribe a spy to the requester's bus
pub fn spy(bridge: &TestBridge) -> Subscription {
    bridge
        .host_bus()
        .subscribe()
        .unwrap_or_else(|e| panic!("cannot subscribe to host bus: {e}"))
}
