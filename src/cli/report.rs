use crate::common::Result;
use crate::core::recognizer::{average_embeddings, l2_norm, Embedding};
use crate::core::whitelist::Whitelist;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "whitelist_similarity.txt";
pub const CSV_FILE_NAME: &str = "whitelist_embeddings.csv";

/// Text report of pairwise distances between whitelist entries.
///
/// Pairs closer than the threshold would be treated as the same person, so
/// they are flagged for threshold tuning.
pub fn similarity_report(whitelist: &Whitelist) -> String {
    let entries = whitelist.entries();
    let mut content = String::new();

    let _ = writeln!(content, "Whitelist similarity report");
    let _ = writeln!(content, "Entries: {}", entries.len());
    let _ = writeln!(content, "Metric: {}", whitelist.metric());
    let _ = writeln!(content, "Threshold: {:.3}", whitelist.threshold());
    let _ = writeln!(
        content,
        "Embedding dimension: {}",
        entries.first().map(|e| e.embedding.len()).unwrap_or(0)
    );
    content.push('\n');

    content.push_str("Pairwise distances:\n");
    let mut confusable = 0;
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            let distance = whitelist.distance(&entries[i].embedding, &entries[j].embedding);
            let flag = if distance < whitelist.threshold() {
                confusable += 1;
                "  [below threshold]"
            } else {
                ""
            };
            let _ = writeln!(content, "{} vs {}: {:.4}{}", entries[i].name, entries[j].name, distance, flag);
        }
    }

    content.push_str("\nNearest neighbour:\n");
    for (i, entry) in entries.iter().enumerate() {
        let nearest = entries
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, other)| (other, whitelist.distance(&entry.embedding, &other.embedding)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((other, distance)) => {
                let _ = writeln!(content, "{} -> {} ({:.4})", entry.name, other.name, distance);
            }
            None => {
                let _ = writeln!(content, "{} -> (none)", entry.name);
            }
        }
    }

    if entries.len() > 1 {
        let all: Vec<Embedding> = entries.iter().map(|e| e.embedding.clone()).collect();
        let centroid = average_embeddings(&all);
        content.push_str("\nDistance to whitelist centroid:\n");
        for entry in entries {
            let _ = writeln!(content, "{}: {:.4}", entry.name, whitelist.distance(&entry.embedding, &centroid));
        }
    }

    let _ = writeln!(content, "\nPairs below threshold: {}", confusable);
    content
}

pub fn write_similarity_report(whitelist: &Whitelist, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(REPORT_FILE_NAME);
    fs::write(&path, similarity_report(whitelist))?;
    tracing::info!("Saved similarity report to {}", path.display());
    Ok(path)
}

/// One row per entry: name, L2 norm, then every embedding dimension.
pub fn embeddings_csv(whitelist: &Whitelist) -> String {
    let entries = whitelist.entries();
    let mut content = String::new();

    let Some(first) = entries.first() else {
        return content;
    };

    content.push_str("name,l2_norm");
    for i in 0..first.embedding.len() {
        let _ = write!(content, ",dim_{}", i);
    }
    content.push('\n');

    for entry in entries {
        let _ = write!(content, "{},{}", entry.name, l2_norm(&entry.embedding));
        for value in &entry.embedding {
            let _ = write!(content, ",{}", value);
        }
        content.push('\n');
    }

    content
}

pub fn export_embeddings_csv(whitelist: &Whitelist, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(CSV_FILE_NAME);
    fs::write(&path, embeddings_csv(whitelist))?;
    tracing::info!("Exported embeddings to {}", path.display());
    Ok(path)
}
