use std::sync::Arc;

use campus_share::catalog::{Catalog, ResourceFilter};
use campus_share::config::{CatalogConfig, RecommendationConfig, StorageConfig};
use campus_share::engagement::EngagementLedger;
use campus_share::models::{Resource, ResourceType, Role, SharingScope, Viewer, VoteTarget};
use campus_share::recommendation::RecommendationEngine;
use campus_share::resources::{BaseUrlLocator, ResourceService};
use campus_share::store::{EngagementStore, InMemoryStore, ResourceStore};
use campus_share::Error;
use uuid::Uuid;

struct Harness {
    store: InMemoryStore,
    catalog: Catalog,
    ledger: EngagementLedger,
    service: ResourceService,
    recommender: RecommendationEngine,
}

fn harness() -> Harness {
    let store = InMemoryStore::new();
    let resources: Arc<dyn ResourceStore> = Arc::new(store.clone());
    let engagement: Arc<dyn EngagementStore> = Arc::new(store.clone());
    let ledger = EngagementLedger::new(resources.clone(), engagement);
    Harness {
        catalog: Catalog::new(resources.clone(), CatalogConfig::default()),
        service: ResourceService::new(
            resources.clone(),
            ledger.clone(),
            Arc::new(BaseUrlLocator::new("https://files.example.edu")),
            StorageConfig::default(),
        ),
        recommender: RecommendationEngine::new(resources, RecommendationConfig::default()),
        ledger,
        store,
    }
}

#[tokio::test]
async fn resource_lifecycle_across_services() {
    let h = harness();
    let university = Uuid::new_v4();
    let owner = Viewer::student(Uuid::new_v4()).with_university(university);
    let moderator = Viewer::student(Uuid::new_v4()).with_role(Role::Moderator);

    let mut draft = Resource::new(owner.id, "Thermodynamics cheat sheet", ResourceType::Notes);
    draft.sharing_scope = SharingScope::University;
    draft.university_id = Some(university);
    draft.storage_key = "uploads/thermo.pdf".to_string();
    draft.tags = vec![" physics ".to_string(), "physics".to_string(), String::new()];
    draft.download_count = 999;
    let saved = h.service.save_resource(&owner, draft).await.unwrap();
    assert_eq!(saved.tags, vec!["physics".to_string()]);
    assert_eq!(saved.download_count, 0);

    // Listed for a same-university viewer, hidden from anonymous callers
    let filter = ResourceFilter::default();
    let page = h.catalog.list_resources(&filter, Some(&owner)).await.unwrap();
    assert_eq!(page.total, 1);
    let page = h.catalog.list_resources(&filter, None).await.unwrap();
    assert_eq!(page.total, 0);

    // Unapproved resources leave the catalog but stay directly fetchable
    h.service
        .set_approval(&moderator, saved.id, false)
        .await
        .unwrap();
    let page = h.catalog.list_resources(&filter, Some(&owner)).await.unwrap();
    assert_eq!(page.total, 0);
    let view = h.service.get_resource(saved.id).await.unwrap();
    assert!(view.file_url.is_some());

    let link = h.service.download_resource(saved.id).await.unwrap();
    assert!(link.download_url.url.contains("uploads/thermo.pdf"));

    let stored = h.store.find_by_id(saved.id).await.unwrap().unwrap();
    assert_eq!(stored.view_count, 1);
    assert_eq!(stored.download_count, 1);

    // Deletion hides the resource from every path
    let stranger = Viewer::student(Uuid::new_v4());
    assert!(matches!(
        h.service.delete_resource(&stranger, saved.id).await,
        Err(Error::Forbidden { .. })
    ));
    h.service.delete_resource(&owner, saved.id).await.unwrap();
    assert!(matches!(
        h.service.get_resource(saved.id).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        h.ledger.rate(saved.id, stranger.id, 4).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn rating_upsert_keeps_one_row_per_user() {
    let h = harness();
    let resource = Resource::new(Uuid::new_v4(), "Organic chemistry slides", ResourceType::Slides);
    h.store.insert_resource(resource.clone()).await;

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    h.ledger.rate(resource.id, alice, 2).await.unwrap();
    h.ledger.rate(resource.id, alice, 5).await.unwrap();
    h.ledger.rate(resource.id, bob, 4).await.unwrap();

    assert_eq!(h.store.rating_rows(resource.id).await, 2);
    let summary = h.ledger.rating_summary(resource.id).await.unwrap();
    assert_eq!(summary.count, 2);
    assert!((summary.average - 4.5).abs() < f64::EPSILON);

    let mine = h.ledger.user_rating(resource.id, alice).await.unwrap().unwrap();
    assert_eq!(mine.value, 5);

    for bad in [0, 6, -1] {
        assert!(matches!(
            h.ledger.rate(resource.id, alice, bad).await,
            Err(Error::Validation { .. })
        ));
    }
    let summary = h.ledger.rating_summary(resource.id).await.unwrap();
    assert_eq!(summary.count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tallies_match_live_votes_under_concurrent_flips() {
    let h = harness();
    let target = VoteTarget::Topic(h.store.insert_topic().await);
    let voters: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();

    let mut handles = Vec::new();
    for (i, voter) in voters.iter().copied().enumerate() {
        let ledger = h.ledger.clone();
        handles.push(tokio::spawn(async move {
            // Each voter casts, repeats and flips in a voter-specific order
            let first = i % 2 == 0;
            for is_upvote in [first, first, !first, first] {
                ledger.vote(target, voter, is_upvote).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let tally = h.ledger.tally(target).await.unwrap();
    let (up, down) = h.store.live_vote_counts(target).await;
    assert_eq!((tally.upvote_count, tally.downvote_count), (up, down));
    assert_eq!(up + down, voters.len() as i64);
    assert_eq!(tally.upvote_count, 10);
    assert_eq!(tally.downvote_count, 10);

    for (i, voter) in voters.iter().enumerate() {
        let vote = h.ledger.user_vote(target, *voter).await.unwrap().unwrap();
        assert_eq!(vote.is_upvote, i % 2 == 0);
    }
}

#[tokio::test]
async fn similar_resources_exclude_deleted_and_self() {
    let h = harness();
    let owner = Viewer::student(Uuid::new_v4()).with_role(Role::Admin);
    let department = Uuid::new_v4();

    let mut ids = Vec::new();
    for (title, downloads) in [("Lecture 1", 5), ("Lecture 2", 50), ("Lecture 3", 20)] {
        let mut r = Resource::new(owner.id, title, ResourceType::Slides);
        r.department_id = Some(department);
        r.download_count = downloads;
        h.store.insert_resource(r.clone()).await;
        ids.push(r.id);
    }

    let similar = h.recommender.similar_to(ids[0], Some(10)).await.unwrap();
    let found: Vec<Uuid> = similar.iter().map(|s| s.resource.id).collect();
    assert_eq!(found, vec![ids[1], ids[2]]);

    h.service.delete_resource(&owner, ids[1]).await.unwrap();
    let similar = h.recommender.similar_to(ids[0], Some(10)).await.unwrap();
    let found: Vec<Uuid> = similar.iter().map(|s| s.resource.id).collect();
    assert_eq!(found, vec![ids[2]]);
}
