use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use csv::Writer;
use log::info;

use crate::config::FuzzyConfig;
use crate::errors::{ModeError, Result};
use crate::field::FieldTag;
use crate::pipeline::ModeResult;

/// Six decimals, or NA for missing and non-finite values
fn fmt_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.6}", v),
        _ => "NA".to_string(),
    }
}

fn fmt_ids(ids: &[usize]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" ")
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write one row per simple object of both fields
pub fn write_objects_csv<P: AsRef<Path>>(
    result: &ModeResult,
    config: &FuzzyConfig,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = Writer::from_path(path)?;

    writer.write_record([
        "Field",
        "Object_Id",
        "Merge_Group",
        "Matched",
        "Area",
        "Threshold_Area",
        "Centroid_X",
        "Centroid_Y",
        "Orientation",
        "Length",
        "Width",
        "Aspect_Ratio",
        "Complexity",
        "Hull_Area",
        "Boundary_Loops",
        "X_Min",
        "X_Max",
        "Y_Min",
        "Y_Max",
        "Intensity_P10",
        "Intensity_P25",
        "Intensity_P50",
        "Intensity_P75",
        "Intensity_P90",
        "Intensity_User",
        "Intensity_Sum",
    ])?;

    for tag in [FieldTag::Fcst, FieldTag::Obs] {
        let groups = result.merge_groups(tag);
        let matched = result.matched_flags(tag);

        for (i, object) in result.field(tag).objects.iter().enumerate() {
            let intensity = object.intensity.summary(config.intensity_percentile);
            writer.write_record(&[
                tag.to_string(),
                object.id.to_string(),
                groups.get(i).copied().unwrap_or(0).to_string(),
                matched.get(i).copied().unwrap_or(false).to_string(),
                object.area.to_string(),
                object.threshold_area.to_string(),
                format!("{:.6}", object.centroid.x),
                format!("{:.6}", object.centroid.y),
                format!("{:.6}", object.orientation),
                format!("{:.6}", object.length),
                format!("{:.6}", object.width),
                fmt_value(object.aspect_ratio),
                format!("{:.6}", object.complexity),
                format!("{:.1}", object.hull_pixel_count),
                object.boundary.len().to_string(),
                object.bbox.x_min.to_string(),
                object.bbox.x_max.to_string(),
                object.bbox.y_min.to_string(),
                object.bbox.y_max.to_string(),
                fmt_value(intensity.p10),
                fmt_value(intensity.p25),
                fmt_value(intensity.p50),
                fmt_value(intensity.p75),
                fmt_value(intensity.p90),
                fmt_value(intensity.user),
                fmt_value(intensity.sum),
            ])?;
        }
    }

    writer.flush().map_err(|e| ModeError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}

/// Write the cross-field pairs whose interest reaches `print_interest_thresh`
pub fn write_pairs_csv<P: AsRef<Path>>(
    result: &ModeResult,
    config: &FuzzyConfig,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = Writer::from_path(path)?;

    writer.write_record([
        "Fcst_Id",
        "Obs_Id",
        "Centroid_Dist",
        "Boundary_Dist",
        "Convex_Hull_Dist",
        "Angle_Diff",
        "Area_Ratio",
        "Int_Area_Ratio",
        "Complexity_Ratio",
        "Intensity_Ratio",
        "Intersection_Area",
        "Union_Area",
        "Symmetric_Diff",
        "Skipped",
        "Interest",
    ])?;

    let mut written = 0;
    for pair in result
        .pairs
        .iter()
        .filter(|p| p.interest >= config.print_interest_thresh)
    {
        let d = &pair.distances;
        writer.write_record(&[
            pair.id_a.to_string(),
            pair.id_b.to_string(),
            fmt_value(Some(d.centroid_dist)),
            fmt_value(Some(d.boundary_dist)),
            fmt_value(Some(d.convex_hull_dist)),
            fmt_value(Some(d.angle_diff)),
            fmt_value(Some(d.area_ratio)),
            fmt_value(Some(d.int_area_ratio)),
            fmt_value(Some(d.complexity_ratio)),
            fmt_value(Some(d.intensity_ratio)),
            pair.intersection_area.to_string(),
            pair.union_area.to_string(),
            pair.symmetric_diff.to_string(),
            pair.skipped.to_string(),
            format!("{:.6}", pair.interest),
        ])?;
        written += 1;
    }

    writer.flush().map_err(|e| ModeError::CsvOutput(csv::Error::from(e)))?;

    info!("Wrote {} of {} pairs to {}", written, result.pairs.len(), path.display());
    Ok(())
}

/// Write one row per cluster pair
pub fn write_clusters_csv<P: AsRef<Path>>(result: &ModeResult, path: P) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = Writer::from_path(path)?;

    writer.write_record([
        "Cluster_Id",
        "Fcst_Members",
        "Obs_Members",
        "Fcst_Area",
        "Obs_Area",
        "Fcst_Centroid_X",
        "Fcst_Centroid_Y",
        "Obs_Centroid_X",
        "Obs_Centroid_Y",
        "Fcst_Orientation",
        "Obs_Orientation",
        "Centroid_Dist",
        "Angle_Diff",
        "Intersection_Area",
        "Union_Area",
        "Symmetric_Diff",
        "Interest",
    ])?;

    for cluster in &result.clusters.pairs {
        let (f, o) = (&cluster.fcst.object, &cluster.obs.object);
        writer.write_record(&[
            cluster.id.to_string(),
            fmt_ids(&cluster.fcst.members),
            fmt_ids(&cluster.obs.members),
            f.area.to_string(),
            o.area.to_string(),
            format!("{:.6}", f.centroid.x),
            format!("{:.6}", f.centroid.y),
            format!("{:.6}", o.centroid.x),
            format!("{:.6}", o.centroid.y),
            format!("{:.6}", f.orientation),
            format!("{:.6}", o.orientation),
            fmt_value(Some(cluster.pair.distances.centroid_dist)),
            fmt_value(Some(cluster.pair.distances.angle_diff)),
            cluster.pair.intersection_area.to_string(),
            cluster.pair.union_area.to_string(),
            cluster.pair.symmetric_diff.to_string(),
            format!("{:.6}", cluster.pair.interest),
        ])?;
    }

    writer.flush().map_err(|e| ModeError::CsvOutput(csv::Error::from(e)))?;

    Ok(())
}

/// Write the run summary as pretty-printed JSON
pub fn write_summary_json<P: AsRef<Path>>(result: &ModeResult, path: P) -> Result<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &result.summary)?;
    Ok(())
}

/// Write every output file into `output_dir`
pub fn write_all<P: AsRef<Path>>(result: &ModeResult, config: &FuzzyConfig, output_dir: P) -> Result<()> {
    let dir = output_dir.as_ref();
    fs::create_dir_all(dir)?;

    write_objects_csv(result, config, dir.join("objects.csv"))?;
    write_pairs_csv(result, config, dir.join("pairs.csv"))?;
    write_clusters_csv(result, dir.join("clusters.csv"))?;
    write_summary_json(result, dir.join("summary.json"))?;

    info!("Results written to {}", dir.display());
    Ok(())
}
