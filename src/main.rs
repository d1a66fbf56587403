use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::Path;

use project_consolidation::{load_csv, ConsolidationEngine, EngineConfig};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: project-consolidation <records.csv> <config.json> [units.json] [flat.csv]");
        bail!("Missing required arguments");
    }

    run_consolidation(
        Path::new(&args[1]),
        Path::new(&args[2]),
        args.get(3).map(String::as_str),
        args.get(4).map(String::as_str),
    )
}

fn run_consolidation(
    records_path: &Path,
    config_path: &Path,
    units_out: Option<&str>,
    flat_out: Option<&str>,
) -> Result<()> {
    println!("🏛️  Project Unit Consolidation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load configuration
    println!("\n⚙️  Loading configuration...");
    let config = EngineConfig::from_file(config_path)?;
    println!(
        "✓ Region lat [{}, {}], lon [{}, {}] | radius {} m | threshold {}%",
        config.bounding_region.lat_min,
        config.bounding_region.lat_max,
        config.bounding_region.lon_min,
        config.bounding_region.lon_max,
        config.spatial_radius_m,
        config.textual_similarity_threshold,
    );

    // 2. Load records
    println!("\n📂 Loading records...");
    let records = load_csv(records_path)?;
    println!("✓ Loaded {} raw records from CSV", records.len());

    // 3. Run the engine
    println!("\n🔍 Consolidating...");
    let engine = ConsolidationEngine::new(config)?;
    let output = engine.run(records);

    let stats = &output.report.coordinate_stats;
    println!("✓ Coordinates: {}", stats.summary());
    if output.report.fallback_spatial || output.report.fallback_textual {
        println!("⚠️  Fallback grouping was used for at least one subset");
    }
    println!(
        "✓ {} records -> {} units / {} interventions",
        output.report.input_count,
        output.report.unit_count,
        output.report.intervention_count,
    );

    // 4. Write outputs
    if let Some(path) = units_out {
        let json = serde_json::to_string_pretty(&output.units)
            .context("Failed to serialize unit map")?;
        fs::write(path, json).with_context(|| format!("Failed to write units JSON: {}", path))?;
        println!("\n💾 Units written to {}", path);
    }

    if let Some(path) = flat_out {
        let rows = &output.flat_rows;
        let mut writer =
            csv::Writer::from_path(path).with_context(|| format!("Failed to open {}", path))?;
        for row in rows {
            writer.serialize(row).context("Failed to serialize flat row")?;
        }
        writer.flush().context("Failed to flush flat CSV")?;
        println!("💾 Flat projection ({} rows) written to {}", rows.len(), path);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {}", output.report.summary());

    Ok(())
}
