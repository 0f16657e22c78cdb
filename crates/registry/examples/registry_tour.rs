//! Example: configuring and using registry caches
//!
//! Walks through a TOML-configured registry: a bounded plain cache with a
//! write-through hook, a loading cache, and an async cache running on the
//! no-op loader substitute.
//!
//! Run with: `cargo run --example registry_tour -p larder-registry`

use std::sync::Arc;

use larder_registry::{
    BoxedError, CacheLoader, CacheRegistry, CacheWriter, RemovalCause, TomlConfig,
};

struct UppercaseLoader;

impl CacheLoader<String, String> for UppercaseLoader {
    fn load(&self, key: &String) -> Result<Option<String>, BoxedError> {
        if key.is_empty() {
            return Ok(None);
        }
        Ok(Some(key.to_uppercase()))
    }
}

struct PrintlnWriter;

impl CacheWriter<u64, String> for PrintlnWriter {
    fn write(&self, key: &u64, value: &String) {
        println!("  writer: write {key} => {value}");
    }

    fn delete(&self, key: &u64, _value: Option<&String>, cause: RemovalCause) {
        println!("  writer: delete {key} ({cause:?}, evicted: {})", cause.was_evicted());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("Cache Registry Tour");
    println!("===================\n");

    let config = TomlConfig::parse(
        r#"
        [server.cache.users]
        maximum-size = 3

        [server.cache.users.expiration]
        time-unit = "MINUTES"
        time-after-access = 10
        "#,
    )?;
    let registry = Arc::new(CacheRegistry::new(Arc::new(config)));

    // A bounded plain cache with a write-through hook
    println!("1. Plain cache with writer (maximum-size = 3)");
    registry.providers().register_writer::<u64, String>("users", Arc::new(PrintlnWriter));
    let users = registry.cache::<u64, String>("users")?;
    for id in 0..5u64 {
        users.insert(id, format!("user-{id}"));
    }
    users.run_pending_tasks();
    println!("  {} of 5 inserted entries retained\n", users.entry_count());

    // A loading cache materializing misses through its loader
    println!("2. Loading cache");
    registry.providers().register_loader::<String, String>("shouting", Arc::new(UppercaseLoader));
    let shouting = registry.loading_cache::<String, String>("shouting")?;
    println!("  load miss: {:?}", shouting.get(&"hello".to_string())?);
    println!("  cached hit: {:?}", shouting.get(&"hello".to_string())?);
    println!("  absent key: {:?}\n", shouting.get(&String::new())?);

    // An async cache without a loader falls back to the no-op substitute;
    // watch the warning in the log output
    println!("3. Async cache without a registered loader");
    let quiet = registry.async_cache::<String, u64>("quiet")?;
    println!("  miss resolves to: {:?}", quiet.get(&"anything".to_string()).await?);
    quiet.insert("answer".to_string(), 42).await;
    println!("  insert still works: {:?}", quiet.get(&"answer".to_string()).await?);

    Ok(())
}
