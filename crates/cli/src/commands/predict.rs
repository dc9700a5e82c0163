use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use scorelabel_core::predict::{preview_dir_for, PredictProgress, PredictionSummary};
use scorelabel_core::Curator;

use crate::model::LinearModel;

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Short list of ids for the summary, e.g. `a, b, c (+4 more)`.
pub(crate) fn preview_ids(ids: &[String], shown: usize) -> String {
    let head: Vec<&str> = ids.iter().take(shown).map(String::as_str).collect();
    let mut text = head.join(", ");
    if ids.len() > shown {
        text.push_str(&format!(" (+{} more)", ids.len() - shown));
    }
    text
}

fn print_summary(curator: &Curator, summary: &PredictionSummary) {
    println!();
    println!("  Scored:          {:>8}", summary.scored);
    println!("  Already labeled: {:>8}", summary.already_labeled);
    if !summary.missing_features.is_empty() {
        println!(
            "  Missing features:{:>8}   {}",
            summary.missing_features.len(),
            preview_ids(&summary.missing_features, 5)
        );
    }
    if !summary.invalid.is_empty() {
        println!(
            "  Invalid:         {:>8}   {}",
            summary.invalid.len(),
            preview_ids(&summary.invalid, 5)
        );
    }
    if summary.previews > 0 {
        println!(
            "  Previews:        {:>8}   in {}",
            summary.previews,
            preview_dir_for(curator.corpus().dir()).display()
        );
    }
    println!("  Store saved {} times to {}", summary.flushes, curator.store_path().display());
    println!();
}

pub fn run(curator: &mut Curator, model_path: &Path) -> Result<()> {
    let model = LinearModel::from_file(model_path)?;

    let pb = ProgressBar::hidden();
    let mut processed: u64 = 0;
    let summary = curator.predict(
        &model,
        Some(&mut |progress| match progress {
            PredictProgress::Start { total } => {
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_length(total as u64);
                pb.set_style(active_style());
                pb.set_prefix("Scoring");
                pb.enable_steady_tick(std::time::Duration::from_millis(80));
            }
            PredictProgress::Scored { id, score } => {
                pb.set_message(format!("{id} {score:.3}"));
                pb.inc(1);
                processed += 1;
            }
            PredictProgress::Skipped { id, .. } => {
                pb.set_message(format!("{id} skipped"));
                pb.inc(1);
                processed += 1;
            }
            PredictProgress::Flushed { processed: n } => {
                pb.println(format!("  Saved store after {n} images"));
            }
        }),
    );

    pb.set_style(done_style());
    pb.set_prefix("done");
    pb.finish_with_message(format!("Processed {processed} images"));

    let summary = summary?;
    print_summary(curator, &summary);
    Ok(())
}
