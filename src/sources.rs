use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::traits::SourceRegistry;

/// Prints every registered source and the options it accepts.
pub async fn list_sources(config: &Config, registry: &SourceRegistry) -> Result<()> {
    let ctx = db::open_context(config).await?;
    let descriptors = registry.descriptors(&ctx).await;

    println!("{:<16} {:<16} OPTIONS", "SOURCE", "LABEL");
    for d in &descriptors {
        let keys: Vec<&str> = d.options.iter().map(|o| o.key.as_str()).collect();
        println!("{:<16} {:<16} {}", d.name, d.label, keys.join(", "));
    }

    for d in &descriptors {
        println!();
        println!("{} ({})", d.label, d.name);
        for o in &d.options {
            println!("  {:<18} {}", o.key, o.description);
            if !o.values.is_empty() {
                println!("  {:<18} values: {}", "", o.values.join(", "));
            }
        }
    }

    ctx.pool.close().await;
    Ok(())
}
