// Social Sync demo - drives posts, likes, comments, follows and
// notifications through the in-memory document store

use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use social_sync::{
    app_state::AppState,
    config::Config,
    core::{DocumentId, UserId, ViewerContext},
    infrastructure::{CollectionPath, DocumentCodec, DocumentStore, MemoryStore},
    models::Profile,
    services::{NotificationAggregator, PostSynchronizer, ProfileManager},
};

async fn wait_until<T>(mut rx: watch::Receiver<T>, ready: impl FnMut(&T) -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(ready)).await??;
    Ok(())
}

async fn seed_profile(store: &MemoryStore, id: &str, profile: Profile) -> anyhow::Result<()> {
    store
        .set(&CollectionPath::profiles(), &DocumentId::new(id), profile.to_fields())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (state, raw) = AppState::in_memory(config);

    let ada_profile = Profile {
        name: "Ada Lovelace".to_string(),
        subtitle: "Engineer at Analytical Engines".to_string(),
        years_in_fraternity: 4,
        profile_pic_name: "ada".to_string(),
        ..Profile::default()
    };
    let bob_profile = Profile {
        name: "Bob Byte".to_string(),
        subtitle: "Student".to_string(),
        looking_for_work_title: "Engineering Intern".to_string(),
        profile_pic_name: "bob".to_string(),
        ..Profile::default()
    };
    let carol_profile = Profile {
        name: "Carol Cache".to_string(),
        subtitle: "Analyst".to_string(),
        ..Profile::default()
    };
    seed_profile(&raw, "ada", ada_profile.clone()).await?;
    seed_profile(&raw, "bob", bob_profile.clone()).await?;
    seed_profile(&raw, "carol", carol_profile).await?;
    info!("Seeded 3 profiles");

    let (ada, bob, carol) = (UserId::new("ada"), UserId::new("bob"), UserId::new("carol"));

    // Feed
    let ada_posts = PostSynchronizer::new(&state, ViewerContext::new(ada.clone()));
    let bob_posts = PostSynchronizer::new(&state, ViewerContext::new(bob.clone()));
    ada_posts.fetch_all().await?;
    bob_posts.fetch_all().await?;

    ada_posts.create("Hello", &ada_profile).await?;
    ada_posts
        .create("Engineering notes on the difference engine", &ada_profile)
        .await?;
    wait_until(bob_posts.watch_posts(), |posts| posts.len() == 2).await?;

    let hello = bob_posts
        .posts()
        .into_iter()
        .find(|post| post.content == "Hello")
        .ok_or_else(|| anyhow::anyhow!("seeded post missing from feed"))?;

    println!("📰 Feed as seen by bob:");
    for post in bob_posts.posts() {
        println!("  {} ({} likes): {}", post.author_first_name(), post.like_count, post.content);
    }

    // Likes: only the first toggle notifies
    bob_posts.toggle_like(&hello, &bob).await?;
    wait_until(bob_posts.watch_posts(), |posts| {
        posts.iter().any(|post| post.id == hello.id && post.like_count == 1)
    })
    .await?;
    println!("👍 bob liked \"{}\"", hello.content);
    bob_posts.toggle_like(&hello, &bob).await?;
    println!("👎 bob unliked \"{}\"", hello.content);

    bob_posts.add_comment(&hello, "Welcome aboard!", &bob_profile).await?;
    bob_posts.fetch_comments(&hello).await?;
    wait_until(bob_posts.watch_comments(), |comments| comments.len() == 1).await?;
    for comment in bob_posts.comments() {
        println!("💬 {}: {}", comment.author_name, comment.content);
    }

    // Follow graph
    let ada_manager = ProfileManager::new(&state, ViewerContext::new(ada.clone()), None);
    ada_manager.fetch_profile().await?;
    let carol_page = ProfileManager::new(&state, ViewerContext::new(ada.clone()), Some(carol.clone()));
    carol_page.fetch_profile().await?;
    carol_page.toggle_follow(&carol, &ada).await?;
    println!("➕ ada follows carol: {}", carol_page.is_viewer_following());
    carol_page.toggle_follow(&carol, &ada).await?;
    println!("➖ ada follows carol: {}", carol_page.is_viewer_following());

    let bob_manager = ProfileManager::new(&state, ViewerContext::new(bob.clone()), Some(ada.clone()));
    bob_manager.toggle_follow(&ada, &bob).await?;
    ada_manager.fetch_profile().await?;
    println!("👥 ada's followers: {:?}", ada_manager.follower_names());

    // Derived views
    bob_manager.fetch_all_profiles().await?;
    let found: Vec<String> = bob_manager
        .search("ca")
        .into_iter()
        .map(|entry| entry.profile.name)
        .collect();
    println!("🔎 directory search \"ca\": {:?}", found);
    for post in bob_posts.for_you(&bob_profile) {
        println!("✨ for bob: {}", post.content);
    }

    // Notifications
    let ada_inbox = NotificationAggregator::new(&state);
    ada_inbox.subscribe(&ada).await?;
    wait_until(ada_inbox.watch(), |items| items.len() == 3).await?;
    println!("🔔 ada's notifications:");
    for message in ada_inbox.messages() {
        println!("  {}", message);
    }

    let carol_inbox = NotificationAggregator::new(&state);
    carol_inbox.subscribe(&carol).await?;
    wait_until(carol_inbox.watch(), |items| items.len() == 1).await?;
    println!("🔔 carol's notifications:");
    for message in carol_inbox.messages() {
        println!("  {}", message);
    }

    ada_posts.unsubscribe().await;
    bob_posts.unsubscribe().await;
    ada_inbox.unsubscribe().await;
    carol_inbox.unsubscribe().await;

    println!("📊 Metrics:");
    println!("{}", serde_json::to_string_pretty(&state.metrics.snapshot_json().await)?);
    Ok(())
}
