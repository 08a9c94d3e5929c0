//! Segment distribution chart using Plotters

use crate::report::SegmentCount;
use crate::segment::SegmentTier;
use anyhow::bail;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

/// Bar color per segment
fn segment_color(segment: SegmentTier) -> RGBColor {
    match segment {
        SegmentTier::Vip => RGBColor(212, 175, 55),
        SegmentTier::Loyal => RGBColor(160, 160, 170),
        SegmentTier::Casual => RGBColor(176, 113, 65),
        SegmentTier::Churned => RED,
    }
}

/// Upper bound of the count axis, with headroom above the tallest bar
fn y_axis_max(summary: &[SegmentCount]) -> usize {
    let tallest = summary.iter().map(|c| c.customers).max().unwrap_or(0);
    (tallest + tallest / 10).max(tallest + 1)
}

/// Draw a bar chart of customers per segment
///
/// # Arguments
/// * `summary` - Per-segment counts from a report
/// * `output_path` - Path to save the PNG
pub fn create_segment_chart(summary: &[SegmentCount], output_path: &Path) -> crate::Result<()> {
    if summary.is_empty() {
        bail!("No segments to chart: the batch produced zero customers");
    }

    let labels: Vec<&str> = summary.iter().map(|c| c.segment.name()).collect();

    let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0..summary.len()).into_segmented(),
            0usize..y_axis_max(summary),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .x_label_formatter(&|value| match value {
            SegmentValue::CenterOf(idx) => labels.get(*idx).copied().unwrap_or("").to_string(),
            _ => String::new(),
        })
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (idx, count) in summary.iter().enumerate() {
        let color = segment_color(count.segment);
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (SegmentValue::Exact(idx), 0),
                (SegmentValue::Exact(idx + 1), count.customers),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    info!(path = %output_path.display(), "Segment chart saved");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn summary() -> Vec<SegmentCount> {
        vec![
            SegmentCount {
                segment: SegmentTier::Vip,
                customers: 3,
            },
            SegmentCount {
                segment: SegmentTier::Casual,
                customers: 40,
            },
            SegmentCount {
                segment: SegmentTier::Churned,
                customers: 12,
            },
        ]
    }

    #[test]
    fn test_y_axis_headroom() {
        assert_eq!(y_axis_max(&summary()), 44);
        let single = [SegmentCount {
            segment: SegmentTier::Loyal,
            customers: 1,
        }];
        assert_eq!(y_axis_max(&single), 2);
    }

    #[test]
    fn test_empty_summary_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("empty.png");
        assert!(create_segment_chart(&[], &output_path).is_err());
        assert!(!output_path.exists());
    }

    #[test]
    #[ignore = "needs a system sans-serif font for captions"]
    fn test_create_segment_chart() {
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("segments.png");

        let result = create_segment_chart(&summary(), &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());
    }
}
