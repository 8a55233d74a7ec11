use approx::assert_abs_diff_eq;
use chrono::{TimeZone, Utc};
use eostats::core::ZonalReducer;
use eostats::io::{write_geotiff, RasterReader, RasterWriter};
use eostats::types::{GeoTransform, IndexKind, SpatialReference};
use geo::{polygon, MultiPolygon};
use ndarray::{array, Array2};
use std::fs;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn utm_reference() -> SpatialReference {
    SpatialReference::new(GeoTransform::north_up(500000.0, 4100000.0, 10.0, -10.0), "EPSG:32632")
}

fn index_raster() -> Array2<f32> {
    array![
        [0.10, 0.20, 0.30, f32::NAN],
        [0.40, 0.50, 0.60, 0.70],
        [-0.10, -0.20, f32::NAN, 0.80],
    ]
}

#[test]
fn test_geotiff_roundtrip_preserves_values_and_georeferencing() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("index.tif");

    let raster = index_raster();
    write_geotiff(&path, &raster, &utm_reference(), Some("DEFLATE")).expect("Failed to write GeoTIFF");

    let (data, spatial_ref) = RasterReader::read(&path).expect("Failed to read GeoTIFF");
    assert_eq!(data.dim(), (3, 4));
    assert_eq!(spatial_ref.transform, utm_reference().transform);
    assert!(spatial_ref.crs.contains("32632"), "unexpected CRS {}", spatial_ref.crs);

    for (read, written) in data.iter().zip(raster.iter()) {
        if written.is_nan() {
            assert!(read.is_nan());
        } else {
            assert_abs_diff_eq!(*read, *written, epsilon = 1e-7);
        }
    }
}

#[test]
fn test_zonal_statistics_from_disk_match_in_memory() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("index.tif");
    let raster = index_raster();
    let sref = utm_reference();
    write_geotiff(&path, &raster, &sref, None).expect("Failed to write GeoTIFF");

    // Centres of the two middle columns of the first two rows
    let zone = MultiPolygon::new(vec![polygon![
        (x: 500011.0, y: 4099981.0),
        (x: 500029.0, y: 4099981.0),
        (x: 500029.0, y: 4099999.0),
        (x: 500011.0, y: 4099999.0),
    ]]);

    let reducer = ZonalReducer::new();
    let from_disk = reducer.reduce_raster(&path, &zone).expect("Zonal statistics failed");
    let in_memory = reducer.reduce_array(&raster, &sref, &zone);

    assert_eq!(from_disk.valid_pixels, 4);
    assert_eq!(from_disk.valid_pixels, in_memory.valid_pixels);
    assert_abs_diff_eq!(from_disk.min, 0.2, epsilon = 1e-6);
    assert_abs_diff_eq!(from_disk.max, 0.6, epsilon = 1e-6);
    assert_abs_diff_eq!(from_disk.mean, in_memory.mean, epsilon = 1e-6);
    assert_abs_diff_eq!(from_disk.mean, 0.4, epsilon = 1e-6);
}

#[test]
fn test_disjoint_zone_falls_back() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("index.tif");
    write_geotiff(&path, &index_raster(), &utm_reference(), None).expect("Failed to write GeoTIFF");

    let far_away = MultiPolygon::new(vec![polygon![
        (x: 600000.0, y: 4000000.0),
        (x: 600100.0, y: 4000000.0),
        (x: 600100.0, y: 4000100.0),
    ]]);

    let stats = ZonalReducer::new().reduce_raster(&path, &far_away).expect("Zonal statistics failed");
    assert!(stats.degenerate);
    assert_eq!((stats.min, stats.max, stats.mean), (-1.0, 1.0, 0.0));
}

#[test]
fn test_writer_never_overwrites() {
    init_logging();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let writer = RasterWriter::new(dir.path(), "indices");
    let sref = utm_reference();
    let ts = Utc.with_ymd_and_hms(2024, 7, 14, 10, 30, 0).unwrap();

    let first = writer
        .write_at(&array![[0.1f32, 0.2]], &sref, IndexKind::NDVI, "S2B_T32SPF", ts)
        .expect("First write failed");
    let second = writer
        .write_at(&array![[0.3f32, 0.4]], &sref, IndexKind::NDVI, "S2B_T32SPF", ts)
        .expect("Second write failed");
    let later = writer
        .write_at(&array![[0.5f32, 0.6]], &sref, IndexKind::NDVI, "S2B_T32SPF", ts + chrono::Duration::seconds(1))
        .expect("Third write failed");

    assert_eq!(first.key, "indices/NDVI_S2B_T32SPF_20240714T103000_000000.tif");
    assert_eq!(second.key, "indices/NDVI_S2B_T32SPF_20240714T103000_000000_1.tif");
    assert_ne!(later.key, first.key);

    let (data, _) = RasterReader::read(&first.path).expect("Failed to read first artifact");
    assert_abs_diff_eq!(data[[0, 0]], 0.1, epsilon = 1e-7);

    // Only published artifacts remain; staging is empty
    let published = fs::read_dir(dir.path().join("indices")).unwrap().count();
    assert_eq!(published, 3);
    let staged = fs::read_dir(dir.path().join(".staging")).unwrap().count();
    assert_eq!(staged, 0);
}

#[test]
fn test_writer_with_custom_staging_and_compression() {
    init_logging();
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let staging = root.path().join("scratch");
    let writer = RasterWriter::new(root.path(), "products/ndmi")
        .with_staging_dir(&staging)
        .with_compression(Some("LZW"));
    let ts = Utc.with_ymd_and_hms(2024, 8, 2, 9, 0, 0).unwrap();

    let artifact = writer
        .write_at(&index_raster(), &utm_reference(), IndexKind::NDMI, "S2A_T32SPF", ts)
        .expect("Write with custom staging failed");

    assert_eq!(artifact.key, "products/ndmi/NDMI_S2A_T32SPF_20240802T090000_000000.tif");
    assert!(artifact.path.starts_with(root.path().join("products").join("ndmi")));
    assert!(artifact.path.exists());
    assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    assert!(!root.path().join(".staging").exists());

    let (data, _) = RasterReader::read(&artifact.path).expect("Failed to read artifact");
    assert_abs_diff_eq!(data[[1, 3]], 0.7, epsilon = 1e-7);
    assert!(data[[0, 3]].is_nan());
}
