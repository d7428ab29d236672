mod app;
mod geometry;
mod raster;
mod session;
mod view;

use anyhow::Context;
use geometry::TraceFeature;
use raster::DisplayRaster;
use std::path::Path;
use std::process::ExitCode;

// ── Session Driver ──────────────────────────────────────────────────────────

/// Show `image_path` with whatever `geojson_path` already holds, let the user
/// trace, and return old and new segments together.
fn annotate_image(image_path: &Path, geojson_path: &Path) -> anyhow::Result<TraceFeature> {
    let prior = geometry::load_prior_segments(geojson_path);

    let raster = DisplayRaster::open(image_path)
        .with_context(|| format!("cannot show {}", image_path.display()))?;

    let title = format!(
        "trace-raster - {}",
        image_path
            .file_name()
            .unwrap_or_default()
            .to_str()
            .unwrap_or("")
    );
    let new = app::run_session(raster, prior.clone(), &title)?;
    log::info!("Traced {} new segments", new.len());

    Ok(geometry::merge(prior, new))
}

fn run(image_path: &Path) -> anyhow::Result<()> {
    let output = geometry::output_path(image_path);
    let feature = annotate_image(image_path, &output)?;
    log::info!(
        "Writing {} segments to {}",
        feature.segments().len(),
        output.display()
    );
    let json = feature.to_json()?;
    println!("Saving {}: {}", output.display(), json);
    geometry::persist(&output, &json)
        .with_context(|| format!("cannot save {}", output.display()))?;
    Ok(())
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: trace-raster <map_image.tif>");
        return ExitCode::from(1);
    }

    match run(Path::new(&args[1])) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}
