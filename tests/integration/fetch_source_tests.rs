//! Fetch source behavior against in-memory workers

use crate::fakes::{
    same_object, FakeCacheFactory, FakeContainer, FakeInstance, FakeVolume, FakeWorker,
    QuietDelegate,
};
use resfetch::atc::{MetadataField, PlanId, Version, VersionedResourceTypes};
use resfetch::db::{ContainerMetadata, ContainerOwner, UsedResourceCache};
use resfetch::resource::script::{GET_PROCESS_ID, IN_SCRIPT, RESOURCE_RESULT_PROPERTY};
use resfetch::resource::{
    fetch, FetchSession, FetchSource, FetchSourceFactory, FetchSources, ResourceInstanceFetchSource,
    ResourceType, VersionedSource,
};
use resfetch::worker::{BindMountSource, ContainerSpec, ImageFetchingDelegate, ImageSpec, Volume};
use resfetch::ResfetchError;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TEAM_ID: i64 = 42;

fn version() -> Version {
    Version::from([("some".to_string(), "version".to_string())])
}

fn resource_types() -> VersionedResourceTypes {
    serde_json::from_value(serde_json::json!([{
        "name": "fake-resource-type",
        "type": "registry-image",
        "source": {"repository": "example/fake"},
        "version": {"digest": "sha256:abc"}
    }]))
    .unwrap()
}

fn cache() -> UsedResourceCache {
    UsedResourceCache {
        id: 42,
        key: "cache-key".to_string(),
        resource_type: "fake-resource-type".to_string(),
        version: version(),
    }
}

fn owner() -> ContainerOwner {
    ContainerOwner::build_step(43, PlanId::new("some-plan-id"), TEAM_ID)
}

fn instance_with(version: Version) -> Arc<FakeInstance> {
    Arc::new(FakeInstance {
        resource_type: ResourceType::new("fake-resource-type"),
        version,
        source: BTreeMap::from([("uri".to_string(), serde_json::json!("https://example.com"))]),
        params: BTreeMap::new(),
        resource_types: resource_types(),
        owner: owner(),
        cache: cache(),
        cache_calls: Default::default(),
    })
}

fn session() -> FetchSession {
    FetchSession {
        team_id: TEAM_ID,
        ..Default::default()
    }
}

struct Fixture {
    container: Arc<FakeContainer>,
    worker: Arc<FakeWorker>,
    caches: Arc<FakeCacheFactory>,
    delegate: Arc<dyn ImageFetchingDelegate>,
    instance: Arc<FakeInstance>,
}

impl Fixture {
    fn new() -> Self {
        let container = FakeContainer::new();
        Self {
            worker: FakeWorker::new(container.clone()),
            container,
            caches: FakeCacheFactory::with_metadata(vec![MetadataField::new("some", "metadata")]),
            delegate: Arc::new(QuietDelegate),
            instance: instance_with(version()),
        }
    }

    fn source(&self) -> ResourceInstanceFetchSource {
        ResourceInstanceFetchSource::new(
            self.instance.clone(),
            self.worker.clone(),
            session(),
            self.delegate.clone(),
            self.caches.clone(),
        )
    }

    fn factory_source(&self) -> FetchSources {
        FetchSourceFactory::new(self.caches.clone()).new_fetch_source(
            self.instance.clone(),
            self.worker.clone(),
            session(),
            self.delegate.clone(),
        )
    }

    fn output(&self) -> Arc<dyn Volume> {
        self.container.output.clone()
    }
}

#[tokio::test]
async fn find_returns_initialized_volume() {
    let fixture = Fixture::new();
    let cached = FakeVolume::new("cached-volume");
    *fixture.worker.cached.lock().unwrap() = Some(cached.clone());

    let found = fixture.source().find().await.unwrap();

    let expected = VersionedSource::get(
        version(),
        vec![MetadataField::new("some", "metadata")],
        cached,
    );
    assert_eq!(found, Some(expected));
}

#[tokio::test]
async fn find_without_volume_is_none() {
    let fixture = Fixture::new();

    let found = fixture.source().find().await.unwrap();

    assert_eq!(found, None);
    assert_eq!(fixture.worker.create_count(), 0);
}

#[tokio::test]
async fn find_propagates_lookup_errors() {
    let fixture = Fixture::new();
    *fixture.worker.lookup_error.lock().unwrap() = Some("store down".to_string());

    let err = fixture.source().find().await.unwrap_err();

    assert!(matches!(err, ResfetchError::Store(reason) if reason == "store down"));
}

#[tokio::test]
async fn create_reuses_initialized_volume() {
    let fixture = Fixture::new();
    let cached = FakeVolume::new("cached-volume");
    *fixture.worker.cached.lock().unwrap() = Some(cached.clone());

    let created = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.handle(), "cached-volume");
    assert_eq!(created.version(), &version());
    assert_eq!(fixture.worker.create_count(), 0);
    assert_eq!(fixture.container.run_count(), 0);
}

#[tokio::test]
async fn create_makes_one_container_for_the_owner() {
    let fixture = Fixture::new();

    fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    let calls = fixture.worker.create_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert_eq!(call.owner, owner());
    assert_eq!(call.metadata, ContainerMetadata::default());
    assert_eq!(
        call.spec,
        ContainerSpec {
            team_id: TEAM_ID,
            tags: vec![],
            image_spec: ImageSpec::for_resource_type("fake-resource-type"),
            bind_mounts: vec![BindMountSource::Certs],
            outputs: BTreeMap::from([("resource".to_string(), "/tmp/build/get".to_string())]),
            ..Default::default()
        }
    );
    assert_eq!(call.resource_types, resource_types());
    assert!(same_object(&call.delegate, &fixture.delegate));
}

#[tokio::test]
async fn create_runs_in_script_once() {
    let fixture = Fixture::new();

    fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    let runs = fixture.container.run_calls.lock().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, GET_PROCESS_ID);
    assert_eq!(runs[0].path, IN_SCRIPT);
    assert_eq!(runs[0].args, vec!["/tmp/build/get"]);

    let stdin = fixture.container.stdin.lock().unwrap();
    let request: serde_json::Value = serde_json::from_slice(&stdin[0]).unwrap();
    assert_eq!(request["version"]["some"], "version");
    assert_eq!(request["source"]["uri"], "https://example.com");
}

#[tokio::test]
async fn create_initializes_cache_on_output_volume() {
    let fixture = Fixture::new();

    fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    let inits = fixture.container.output.init_calls.lock().unwrap();
    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].id, 42);
}

#[tokio::test]
async fn create_records_script_metadata() {
    let fixture = Fixture::new();
    fixture.container.set_stdout(
        br#"{"version": {"ref": "abc"}, "metadata": [{"name": "author", "value": "someone"}]}"#,
    );

    let created = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    let metadata = vec![MetadataField::new("author", "someone")];
    assert_eq!(
        created,
        VersionedSource::get(version(), metadata.clone(), fixture.output())
    );

    let updates = fixture.caches.update_calls.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, cache());
    assert_eq!(updates[0].1, metadata);
}

#[tokio::test]
async fn empty_response_yields_zero_values() {
    let mut fixture = Fixture::new();
    fixture.instance = instance_with(Version::new());

    let created = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        created,
        VersionedSource::get(Version::new(), vec![], fixture.output())
    );
}

#[tokio::test]
async fn run_error_is_returned_unchanged() {
    let fixture = Fixture::new();
    *fixture.container.run_error.lock().unwrap() = Some("disaster".to_string());

    let err = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResfetchError::ProcessRun { ref process_id, ref reason }
            if process_id == GET_PROCESS_ID && reason == "disaster"
    ));
    assert_eq!(fixture.container.output.init_count(), 0);
    assert_eq!(fixture.caches.update_count(), 0);
}

#[tokio::test]
async fn failing_script_does_not_initialize() {
    let fixture = Fixture::new();
    *fixture.container.exit_status.lock().unwrap() = 1;

    let err = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResfetchError::ScriptFailed { exit_status: 1, .. }));
    assert_eq!(fixture.container.output.init_count(), 0);
}

#[tokio::test]
async fn malformed_response_does_not_initialize() {
    let fixture = Fixture::new();
    fixture.container.set_stdout(b"cloning...\n");

    let err = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResfetchError::MalformedOutput { .. }));
    assert_eq!(fixture.container.output.init_count(), 0);
    assert_eq!(fixture.caches.update_count(), 0);
}

#[tokio::test]
async fn commit_failure_is_fatal() {
    let fixture = Fixture::new();
    *fixture.container.output.init_error.lock().unwrap() = Some("volume gone".to_string());

    let err = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ResfetchError::Store(reason) if reason == "volume gone"));
    assert_eq!(fixture.caches.update_count(), 0);
}

#[tokio::test]
async fn second_create_hits_the_cache() {
    let fixture = Fixture::new();
    let source = fixture.source();
    let ctx = CancellationToken::new();

    let first = source.create(&ctx).await.unwrap();
    let second = source.create(&ctx).await.unwrap();

    assert_eq!(first.handle(), second.handle());
    assert_eq!(fixture.container.run_count(), 1);
    assert_eq!(fixture.worker.create_count(), 1);
}

#[tokio::test]
async fn recorded_result_skips_the_script() {
    let fixture = Fixture::new();
    fixture.container.properties.lock().unwrap().insert(
        RESOURCE_RESULT_PROPERTY.to_string(),
        r#"{"version": {"some": "version"}, "metadata": [{"name": "a", "value": "b"}]}"#
            .to_string(),
    );

    let created = fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fixture.container.run_count(), 0);
    assert_eq!(created.metadata(), &[MetadataField::new("a", "b")]);
    assert_eq!(fixture.container.output.init_count(), 1);
}

#[tokio::test]
async fn successful_get_records_result() {
    let fixture = Fixture::new();

    fixture
        .source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    let properties = fixture.container.properties.lock().unwrap();
    assert_eq!(
        properties.get(RESOURCE_RESULT_PROPERTY).map(String::as_str),
        Some("{}")
    );
}

#[tokio::test]
async fn cancelled_before_create_starts_nothing() {
    let fixture = Fixture::new();
    let ctx = CancellationToken::new();
    ctx.cancel();

    let err = fixture.source().create(&ctx).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fixture.worker.create_count(), 0);
}

#[tokio::test]
async fn cancellation_kills_the_script() {
    let fixture = Fixture::new();
    fixture.container.hang.store(true, Ordering::SeqCst);
    let ctx = CancellationToken::new();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let source = fixture.source();
    let err = tokio::time::timeout(Duration::from_secs(5), source.create(&ctx))
        .await
        .expect("create did not observe cancellation")
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(fixture.container.killed.load(Ordering::SeqCst));
    assert_eq!(fixture.container.output.init_count(), 0);
}

#[tokio::test]
async fn factory_uses_container_when_supported() {
    let fixture = Fixture::new();

    let source = fixture.factory_source();

    assert!(matches!(source, FetchSources::Container(_)));
}

#[tokio::test]
async fn cache_only_source_never_creates() {
    let fixture = Fixture::new();
    fixture.worker.supports.store(false, Ordering::SeqCst);

    let source = fixture.factory_source();
    assert!(matches!(source, FetchSources::CacheOnly(_)));

    let err = source.create(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ResfetchError::ResourceTypeUnsupported { .. }));
    assert_eq!(fixture.worker.create_count(), 0);
}

#[tokio::test]
async fn cache_only_source_serves_cached_volume() {
    let fixture = Fixture::new();
    fixture.worker.supports.store(false, Ordering::SeqCst);
    *fixture.worker.cached.lock().unwrap() = Some(FakeVolume::new("cached-volume"));

    let created = fixture
        .factory_source()
        .create(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(created.handle(), "cached-volume");
}

#[tokio::test]
async fn fetch_prefers_cache_hit() {
    let fixture = Fixture::new();
    *fixture.worker.cached.lock().unwrap() = Some(FakeVolume::new("cached-volume"));

    let fetched = fetch(&CancellationToken::new(), &fixture.factory_source())
        .await
        .unwrap();

    assert_eq!(fetched.handle(), "cached-volume");
    assert_eq!(fixture.worker.create_count(), 0);
}

#[tokio::test]
async fn fetch_creates_on_miss() {
    let fixture = Fixture::new();

    let fetched = fetch(&CancellationToken::new(), &fixture.factory_source())
        .await
        .unwrap();

    assert_eq!(fetched.handle(), "fake-output-volume");
    assert_eq!(fixture.worker.create_count(), 1);
    assert_eq!(fixture.instance.cache_calls.load(Ordering::SeqCst), 1);
}
