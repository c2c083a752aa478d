//! Dataset inspection.

use std::path::Path;

use anyhow::{Context, Result, bail};
use fer_dataset::{DatasetSummary, LoaderConfig, dataset_length, load_image_folder};

/// Prints a summary of `<data>/train` and `<data>/test`.
pub fn run(data: &Path, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        bail!("batch size must be > 0");
    }
    let config = LoaderConfig::default();

    println!();
    println!("Dataset {}", data.display());
    println!("========{}", "=".repeat(data.display().to_string().len()));

    let mut total: Option<DatasetSummary> = None;
    for split in ["train", "test"] {
        let dir = data.join(split);
        let dataset = load_image_folder(&dir, &config)
            .with_context(|| format!("failed to load {}", dir.display()))?;
        let summary = DatasetSummary::from_dataset(&dataset);

        println!();
        println!("{split}: {} batches of {batch_size}", dataset_length(&dataset, batch_size));
        print!("{}", summary.to_report());
        if !summary.is_balanced(0.05) {
            println!("  (imbalanced)");
        }

        total = Some(match total {
            Some(previous) => previous.merge(&summary),
            None => summary,
        });
    }

    if let Some(total) = total {
        println!();
        println!("combined:");
        print!("{}", total.to_report());
    }
    Ok(())
}
