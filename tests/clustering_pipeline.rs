mod common;

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::mock::StepRng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use common::{at_minute, digest, tight_config};
use csp_cluster::db::NewSample;
use csp_cluster::report::PartitionOutcome;
use csp_cluster::store::ClusterStore;
use csp_cluster::{
    ClusterNameAllocator, ClusteringEngine, Database, EngineError, SampleCategory, UNCLUSTERED,
};

struct Seeded {
    db: Arc<Database>,
    group_a: Vec<i64>,
    group_b: Vec<i64>,
    loner: i64,
    far_loner: i64,
    malformed: i64,
}

async fn seeded_db() -> Seeded {
    let db = Arc::new(Database::in_memory().unwrap());
    let insert = |digest: String, whitelist: bool| {
        let db = Arc::clone(&db);
        async move {
            let sample = NewSample::new("script-src", "script", digest, at_minute(0))
                .whitelisted(whitelist);
            db.insert_sample(SampleCategory::Inline, &sample)
                .await
                .unwrap()
        }
    };

    let group_a = vec![
        insert(digest(0, '0'), false).await,
        insert(digest(0, '1'), true).await,
        insert(digest(0, '3'), false).await,
    ];
    let group_b = vec![
        insert(digest(16, '0'), false).await,
        insert(digest(16, '1'), false).await,
        insert(digest(16, '7'), false).await,
    ];
    let loner = insert(digest(63, 'f'), true).await;
    let far_loner = insert(digest(40, '0'), false).await;
    let malformed = insert("not-a-digest".to_string(), false).await;

    Seeded {
        db,
        group_a,
        group_b,
        loner,
        far_loner,
        malformed,
    }
}

async fn cluster_of(db: &Database, id: i64) -> String {
    db.get_sample(SampleCategory::Inline, id)
        .await
        .unwrap()
        .unwrap()
        .cluster_name
}

async fn whitelist_of(db: &Database, id: i64) -> bool {
    db.get_sample(SampleCategory::Inline, id)
        .await
        .unwrap()
        .unwrap()
        .whitelist
}

async fn shared_name(db: &Database, ids: &[i64]) -> String {
    let mut names = HashSet::new();
    for id in ids {
        names.insert(cluster_of(db, *id).await);
    }
    assert_eq!(names.len(), 1, "members split across {names:?}");
    names.into_iter().next().unwrap()
}

fn seeded_allocator(db_names: HashSet<String>, seed: u64) -> ClusterNameAllocator<StdRng> {
    ClusterNameAllocator::new(db_names, StdRng::seed_from_u64(seed), 100)
}

#[tokio::test]
async fn clusters_partition_and_skips_malformed_digest() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();
    let existing = seeded.db.existing_cluster_names().await.unwrap();

    let report = engine
        .run_with_allocator(seeded_allocator(existing, 1), CancellationToken::new())
        .await
        .unwrap();

    let name_a = shared_name(&seeded.db, &seeded.group_a).await;
    let name_b = shared_name(&seeded.db, &seeded.group_b).await;
    assert_ne!(name_a, name_b);
    assert!(name_a.starts_with("Cl_") && name_a.len() == 12);
    assert!(name_b.starts_with("Cl_") && name_b.len() == 12);

    assert_eq!(cluster_of(&seeded.db, seeded.loner).await, UNCLUSTERED);
    assert_eq!(cluster_of(&seeded.db, seeded.far_loner).await, UNCLUSTERED);
    assert_eq!(cluster_of(&seeded.db, seeded.malformed).await, UNCLUSTERED);

    let inline = report.category(SampleCategory::Inline).unwrap();
    assert_eq!(inline.partitions.len(), 1);
    let partition = &inline.partitions[0];
    assert_eq!(partition.outcome, PartitionOutcome::Clustered);
    assert_eq!(partition.samples, 9);
    assert_eq!(partition.invalid_digests, 1);
    assert_eq!(partition.clusters, 2);
    assert_eq!(partition.noise, 2);
    assert_eq!(report.total_clusters(), 2);
    assert_eq!(report.failed_partitions(), 0);
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn whitelist_spreads_within_clusters_only() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();

    let report = engine.run(CancellationToken::new()).await.unwrap();

    for id in &seeded.group_a {
        assert!(whitelist_of(&seeded.db, *id).await);
    }
    for id in &seeded.group_b {
        assert!(!whitelist_of(&seeded.db, *id).await);
    }
    // noise members keep their own flags
    assert!(whitelist_of(&seeded.db, seeded.loner).await);
    assert!(!whitelist_of(&seeded.db, seeded.far_loner).await);

    let inline = report.category(SampleCategory::Inline).unwrap();
    assert_eq!(inline.whitelisted_clusters, 1);
}

#[tokio::test]
async fn rerun_keeps_membership_with_fresh_names() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();

    let existing = seeded.db.existing_cluster_names().await.unwrap();
    engine
        .run_with_allocator(seeded_allocator(existing, 3), CancellationToken::new())
        .await
        .unwrap();
    let first_a = shared_name(&seeded.db, &seeded.group_a).await;
    let first_b = shared_name(&seeded.db, &seeded.group_b).await;

    let existing = seeded.db.existing_cluster_names().await.unwrap();
    assert!(existing.contains(&first_a));
    engine
        .run_with_allocator(seeded_allocator(existing, 3), CancellationToken::new())
        .await
        .unwrap();
    let second_a = shared_name(&seeded.db, &seeded.group_a).await;
    let second_b = shared_name(&seeded.db, &seeded.group_b).await;

    assert_ne!(second_a, second_b);
    let first: HashSet<_> = [first_a, first_b].into_iter().collect();
    assert!(!first.contains(&second_a));
    assert!(!first.contains(&second_b));
}

#[tokio::test]
async fn small_partitions_are_left_untouched() {
    let db = Arc::new(Database::in_memory().unwrap());
    let lonely = db
        .insert_sample(
            SampleCategory::Event,
            &NewSample::new("onclick", "button", digest(0, '0'), at_minute(0)),
        )
        .await
        .unwrap();
    // one good digest plus one broken one is still below min_points = 2
    db.insert_sample(
        SampleCategory::Event,
        &NewSample::new("onload", "body", digest(0, '0'), at_minute(0)),
    )
    .await
    .unwrap();
    db.insert_sample(
        SampleCategory::Event,
        &NewSample::new("onload", "body", "zz", at_minute(0)),
    )
    .await
    .unwrap();

    let engine = ClusteringEngine::new(Arc::clone(&db), tight_config()).unwrap();
    let report = engine.run(CancellationToken::new()).await.unwrap();

    let event = report.category(SampleCategory::Event).unwrap();
    assert_eq!(event.partitions.len(), 2);
    assert!(event
        .partitions
        .iter()
        .all(|p| p.outcome == PartitionOutcome::TooSmall));
    assert_eq!(event.clusters_built(), 0);

    let sample = db
        .get_sample(SampleCategory::Event, lonely)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sample.cluster_name, UNCLUSTERED);
}

#[tokio::test]
async fn cancelled_run_skips_unstarted_partitions() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine.run(cancel).await.unwrap();

    assert!(report
        .partitions()
        .all(|p| p.outcome == PartitionOutcome::Skipped));
    for id in seeded.group_a.iter().chain(&seeded.group_b) {
        assert_eq!(cluster_of(&seeded.db, *id).await, UNCLUSTERED);
    }
}

#[tokio::test]
async fn name_exhaustion_aborts_the_run() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();

    // a constant generator yields one name, the partition needs two
    let allocator = ClusterNameAllocator::new(HashSet::new(), StepRng::new(0, 0), 3);
    let err = engine
        .run_with_allocator(allocator, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NameSpaceExhausted { attempts: 3 }));
    // names are written per partition only after all of them were allocated
    for id in seeded.group_a.iter().chain(&seeded.group_b) {
        assert_eq!(cluster_of(&seeded.db, *id).await, UNCLUSTERED);
    }
}

#[tokio::test]
async fn uncluster_resets_name_but_not_trust() {
    let seeded = seeded_db().await;
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), tight_config()).unwrap();
    engine.run(CancellationToken::new()).await.unwrap();

    let member = seeded.group_a[0];
    assert_ne!(cluster_of(&seeded.db, member).await, UNCLUSTERED);
    assert!(whitelist_of(&seeded.db, member).await);

    assert!(engine
        .uncluster(SampleCategory::Inline, member)
        .await
        .unwrap());
    assert_eq!(cluster_of(&seeded.db, member).await, UNCLUSTERED);
    assert!(whitelist_of(&seeded.db, member).await);

    assert!(!engine
        .uncluster(SampleCategory::Inline, 9_999)
        .await
        .unwrap());
}

#[tokio::test]
async fn invalid_parameters_are_rejected_up_front() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut config = tight_config();
    config.event.min_points = 0;

    let result = ClusteringEngine::new(db, config);
    assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
}

#[tokio::test]
async fn exhaustion_still_spreads_trust_over_committed_clusters() {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut first = Vec::new();
    let mut second = Vec::new();
    for (segment, ids) in [("a", &mut first), ("b", &mut second)] {
        for (tail, whitelist) in [('0', segment == "a"), ('1', false), ('3', false)] {
            let sample = NewSample::new(segment, "script", digest(0, tail), at_minute(0))
                .whitelisted(whitelist);
            ids.push(
                db.insert_sample(SampleCategory::Inline, &sample)
                    .await
                    .unwrap(),
            );
        }
    }

    let mut config = tight_config();
    config.max_parallel_partitions = 1;
    let engine = ClusteringEngine::new(Arc::clone(&db), config).unwrap();

    // "a" takes the only name the constant generator yields, "b" runs dry
    let allocator = ClusterNameAllocator::new(HashSet::new(), StepRng::new(0, 0), 3);
    let err = engine
        .run_with_allocator(allocator, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NameSpaceExhausted { .. }));

    let committed = shared_name(&db, &first).await;
    assert_ne!(committed, UNCLUSTERED);
    for id in &first {
        assert!(whitelist_of(&db, *id).await, "member {id} left untrusted");
    }
    for id in &second {
        assert_eq!(cluster_of(&db, *id).await, UNCLUSTERED);
    }
}

#[tokio::test]
async fn expired_time_limit_skips_every_partition() {
    let seeded = seeded_db().await;
    let mut config = tight_config();
    config.time_limit_secs = Some(0);
    let engine = ClusteringEngine::new(Arc::clone(&seeded.db), config).unwrap();

    let report = engine.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.partitions().count(), 1);
    assert!(report
        .partitions()
        .all(|p| p.outcome == PartitionOutcome::Skipped));
    assert_eq!(cluster_of(&seeded.db, seeded.group_a[0]).await, UNCLUSTERED);
}
