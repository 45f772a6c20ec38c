//! Integration tests for `ProvisioningEngine::apply` against the simulated
//! backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use devstack_backend::{BackendCall, BackendError, Backends, SimulatedBackend};
use devstack_engine::hooks::ProvisionEvent;
use devstack_engine::{ApplyError, EngineConfig, ProvisioningEngine, ResourceAction};
use devstack_graph::graph::DependencyGraph;
use devstack_graph::output::OutputResolver;
use devstack_graph::resource::{
    ContainerSpec, ImageSpec, NetworkSpec, PortMapping, ResourceId, ResourceState, RestartPolicy,
};
use parking_lot::Mutex;

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Scenario {
    graph: DependencyGraph,
    n: ResourceId,
    i1: ResourceId,
    i2: ResourceId,
    c1: ResourceId,
    c2: ResourceId,
}

/// N; I1, I2; C1 deps {N, I1}; C2 deps {N, I2, C1}.
fn scenario() -> Scenario {
    scenario_with(|spec| spec)
}

fn scenario_with(c2: impl FnOnce(ContainerSpec) -> ContainerSpec) -> Scenario {
    let mut graph = DependencyGraph::new();
    let n = graph.add("N", NetworkSpec::new("devstack-network")).unwrap();
    let i1 = graph.add("I1", ImageSpec::new("i1:latest")).unwrap();
    let i2 = graph.add("I2", ImageSpec::new("i2:latest")).unwrap();
    let c1 = graph
        .add(
            "C1",
            ContainerSpec::new("c1", i1.clone(), n.clone()).with_port(PortMapping::same(2181)),
        )
        .unwrap();
    let c2 = graph
        .declare(
            "C2",
            c2(ContainerSpec::new("c2", i2.clone(), n.clone()).with_port(PortMapping::same(9092))),
            [&c1],
        )
        .unwrap();
    Scenario {
        graph,
        n,
        i1,
        i2,
        c1,
        c2,
    }
}

fn engine(backend: &Arc<SimulatedBackend>, config: EngineConfig) -> ProvisioningEngine {
    ProvisioningEngine::new(Backends::shared(Arc::clone(backend)), config)
}

fn call_index(calls: &[BackendCall], call: &BackendCall) -> usize {
    calls
        .iter()
        .position(|candidate| candidate == call)
        .unwrap_or_else(|| panic!("{call:?} was never made"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ordering and outputs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn creates_everything_in_dependency_order() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    let resolver = OutputResolver::new();

    let report = engine(&backend, EngineConfig::default())
        .apply(&s.graph, &resolver)
        .await
        .unwrap();

    assert!(report.is_success());
    for id in [&s.n, &s.i1, &s.i2, &s.c1, &s.c2] {
        assert_eq!(report.state(id), Some(ResourceState::Ready));
        assert_eq!(report.action(id), Some(ResourceAction::Created));
    }

    let calls = backend.calls();
    let start_c1 = call_index(&calls, &BackendCall::StartContainer("c1".into()));
    let create_c2 = call_index(&calls, &BackendCall::CreateContainer("c2".into()));
    assert!(start_c1 < create_c2, "C2 must wait until C1 is ready");
    assert!(
        call_index(&calls, &BackendCall::FetchImage("i1:latest".into()))
            < call_index(&calls, &BackendCall::CreateContainer("c1".into()))
    );
}

#[tokio::test]
async fn container_outputs_carry_address_and_endpoint() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    let resolver = OutputResolver::new();
    let config = EngineConfig::default().with_advertised_host("localhost");

    engine(&backend, config)
        .apply(&s.graph, &resolver)
        .await
        .unwrap();

    let c1 = resolver.get(&s.c1).unwrap();
    assert_eq!(c1.address(), Some("172.18.0.2"));
    assert_eq!(c1.endpoint(), Some("localhost:2181"));
    assert_eq!(c1.get("name"), Some("c1"));

    let c2 = resolver.get(&s.c2).unwrap();
    assert_eq!(c2.address(), Some("172.18.0.3"));
    assert_eq!(c2.endpoint(), Some("localhost:9092"));

    let net = resolver.get(&s.n).unwrap();
    assert_eq!(net.get("name"), Some("devstack-network"));
    assert_eq!(resolver.get(&s.i2).unwrap().get("reference"), Some("i2:latest"));
}

#[tokio::test]
async fn continuations_fire_once_after_ready() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    let resolver = OutputResolver::new();
    let fired = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&fired);
    resolver.subscribe(&s.c2, move |outputs| {
        sink.lock().push(outputs.address().map(str::to_owned));
    });

    engine(&backend, EngineConfig::default())
        .apply(&s.graph, &resolver)
        .await
        .unwrap();

    assert_eq!(*fired.lock(), vec![Some("172.18.0.3".to_string())]);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let mut graph = DependencyGraph::new();
    for index in 0..10 {
        graph
            .add(format!("img{index}"), ImageSpec::new(format!("image-{index}:latest")))
            .unwrap();
    }
    let backend = Arc::new(SimulatedBackend::new().with_latency(Duration::from_millis(20)));

    engine(&backend, EngineConfig::default().with_max_concurrency(3))
        .apply(&graph, &OutputResolver::new())
        .await
        .unwrap();

    assert_eq!(backend.peak_concurrency(), 3);
    assert_eq!(backend.calls().len(), 10);
}

#[tokio::test]
async fn zero_concurrency_still_makes_progress() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());

    let report = engine(&backend, EngineConfig::default().with_max_concurrency(0))
        .apply(&s.graph, &OutputResolver::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(backend.peak_concurrency(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure propagation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_image_skips_dependents_and_spares_independent_branches() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    backend.missing_image("i1:latest");
    let resolver = OutputResolver::new();

    let err = engine(&backend, EngineConfig::default())
        .apply(&s.graph, &resolver)
        .await
        .unwrap_err();

    let ApplyError::Provisioning(failure) = &err else {
        panic!("expected a provisioning failure, got {err}");
    };
    assert_eq!(
        failure.failed(),
        vec![(
            &s.i1,
            &BackendError::ImageNotFound {
                reference: "i1:latest".into()
            }
        )]
    );
    assert_eq!(failure.skipped(), vec![&s.c1, &s.c2]);

    let report = err.report().unwrap();
    assert_eq!(report.state(&s.n), Some(ResourceState::Ready));
    assert_eq!(report.state(&s.i2), Some(ResourceState::Ready));
    assert_eq!(report.get(&s.c2).unwrap().cause.as_ref(), Some(&s.i1));

    // Nothing downstream of the failure reached the container backend.
    assert!(
        !backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::CreateContainer(_)))
    );
}

#[tokio::test]
async fn aggregated_error_is_a_single_summary() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    backend.missing_image("i1:latest");
    backend.fail_image("i2:latest", "registry timeout");

    let err = engine(&backend, EngineConfig::default())
        .apply(&s.graph, &OutputResolver::new())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(!message.contains('\n'));
    assert!(message.starts_with("provisioning failed: 2 resources failed"), "{message}");
    assert!(message.contains("I1: image not found: i1:latest"), "{message}");
    assert!(message.contains("registry timeout"), "{message}");
    assert!(message.ends_with("skipped: C1, C2"), "{message}");
}

#[tokio::test]
async fn failed_and_skipped_resources_are_abandoned() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    backend.fail_container("c1", "port already allocated");
    let resolver = OutputResolver::new();
    let fired = Arc::new(AtomicUsize::new(0));

    for id in [&s.c1, &s.c2] {
        let fired = Arc::clone(&fired);
        resolver.subscribe(id, move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    let waiter = resolver.handle(&s.c2);

    let result = engine(&backend, EngineConfig::default())
        .apply(&s.graph, &resolver)
        .await;

    assert!(result.is_err());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(waiter.wait().await.is_none());
    assert!(resolver.handle(&s.i1).is_resolved());
}

#[tokio::test]
async fn cyclic_graph_touches_no_backend() {
    let mut graph = DependencyGraph::new();
    let a = graph.add("a", ImageSpec::new("a")).unwrap();
    let b = graph.declare("b", ImageSpec::new("b"), [&a]).unwrap();
    graph.add_dependency(&a, &b).unwrap();
    let backend = Arc::new(SimulatedBackend::new());

    let err = engine(&backend, EngineConfig::default())
        .apply(&graph, &OutputResolver::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApplyError::Graph(_)));
    assert!(err.report().is_none());
    assert!(backend.calls().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Re-apply
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reapply_adopts_existing_resources() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    let engine = engine(&backend, EngineConfig::default());

    let first = OutputResolver::new();
    engine.apply(&s.graph, &first).await.unwrap();
    let calls_after_first = backend.calls().len();

    let second = OutputResolver::new();
    let report = engine.apply(&s.graph, &second).await.unwrap();

    for resource in report.resources() {
        assert_eq!(resource.action, Some(ResourceAction::Unchanged), "{}", resource.id);
    }
    assert_eq!(backend.calls().len(), calls_after_first);
    assert_eq!(
        second.get(&s.c2).unwrap().address(),
        first.get(&s.c2).unwrap().address()
    );
}

#[tokio::test]
async fn changed_declaration_replaces_the_container() {
    let backend = Arc::new(SimulatedBackend::new());
    let engine = engine(&backend, EngineConfig::default());
    engine
        .apply(&scenario().graph, &OutputResolver::new())
        .await
        .unwrap();

    let changed = scenario_with(|spec| spec.with_env("KAFKA_BROKER_ID", 2));
    let report = engine
        .apply(&changed.graph, &OutputResolver::new())
        .await
        .unwrap();

    assert_eq!(report.action(&changed.c1), Some(ResourceAction::Unchanged));
    assert_eq!(report.action(&changed.c2), Some(ResourceAction::Replaced));
    assert!(
        backend
            .calls()
            .contains(&BackendCall::RemoveContainer("c2".into()))
    );
}

#[tokio::test]
async fn stopped_container_is_recreated_under_on_failure() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    let engine = engine(&backend, EngineConfig::default());
    engine.apply(&s.graph, &OutputResolver::new()).await.unwrap();

    assert!(backend.stop_container("c1"));
    let report = engine
        .apply(&s.graph, &OutputResolver::new())
        .await
        .unwrap();

    assert_eq!(report.action(&s.c1), Some(ResourceAction::Replaced));
    assert!(backend.container("c1").unwrap().is_running());
}

#[tokio::test]
async fn stopped_container_without_on_failure_is_restarted_in_place() {
    let s = scenario_with(|spec| spec.with_restart(RestartPolicy::No));
    let backend = Arc::new(SimulatedBackend::new());
    let engine = engine(&backend, EngineConfig::default());
    engine.apply(&s.graph, &OutputResolver::new()).await.unwrap();
    let id_before = backend.container("c2").unwrap().id;

    assert!(backend.stop_container("c2"));
    let resolver = OutputResolver::new();
    let report = engine.apply(&s.graph, &resolver).await.unwrap();

    assert_eq!(report.action(&s.c2), Some(ResourceAction::Unchanged));
    assert_eq!(backend.container("c2").unwrap().id, id_before);
    assert_eq!(resolver.get(&s.c2).unwrap().address(), Some("172.18.0.3"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hooks_observe_the_lifecycle() {
    let s = scenario();
    let backend = Arc::new(SimulatedBackend::new());
    backend.missing_image("i1:latest");
    let engine = engine(&backend, EngineConfig::default());
    let events = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&events);
    engine
        .hooks()
        .register_observer("recorder", move |event: &ProvisionEvent| {
            sink.lock().push(event.clone());
        })
        .unwrap();

    let _ = engine.apply(&s.graph, &OutputResolver::new()).await;
    let events = events.lock();

    assert!(matches!(
        events.first(),
        Some(ProvisionEvent::ApplyStart { resource_count: 5 })
    ));
    assert!(matches!(
        events.last(),
        Some(ProvisionEvent::ApplyComplete {
            ready: 2,
            failed: 1,
            skipped: 2,
            ..
        })
    ));

    let skipped: Vec<(&ResourceId, &ResourceId)> = events
        .iter()
        .filter_map(|event| match event {
            ProvisionEvent::ResourceSkipped {
                resource, cause, ..
            } => Some((resource, cause)),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![(&s.c1, &s.i1), (&s.c2, &s.i1)]);

    // Every ready event follows the matching creating event.
    for (index, event) in events.iter().enumerate() {
        if let ProvisionEvent::ResourceReady { resource, .. } = event {
            assert!(events[..index].iter().any(|earlier| matches!(
                earlier,
                ProvisionEvent::ResourceCreating { resource: r, .. } if r == resource
            )));
        }
    }
}
