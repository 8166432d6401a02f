mod support;

use std::collections::HashSet;
use std::fs;

use asl_classifier::alphabet::Label;
use asl_classifier::dataset::batch::load_image_set;
use asl_classifier::dataset::layout::{census, locate_dataset_root};
use asl_classifier::dataset::split::{BinaryClass, split_by_class};
use asl_classifier::dataset::{PartitionError, WorkDir, materialize};
use support::images::write_dataset;
use tempfile::tempdir;

fn label(c: char) -> Label {
    Label::new(c).unwrap()
}

#[test]
fn nested_archive_layout_partitions_every_image_once() {
    let temp = tempdir().unwrap();
    let extracted = temp.path().join("asl_dataset");
    let root = extracted.join("asl_dataset");
    write_dataset(&root, &[("a", 10), ("b", 15), ("c", 12)], 16);
    fs::write(root.join("b").join("notes.txt"), b"not an image").unwrap();

    let located = locate_dataset_root(temp.path(), 3).unwrap();
    assert_eq!(located, root);
    let counts = census(&located).unwrap();
    assert_eq!(counts.total_images(), 37);
    assert_eq!(counts.count_for("b"), Some(15));

    let mut work = WorkDir::at(temp.path().join("work"));
    let partition = materialize(&located, label('b'), &mut work).unwrap();
    assert_eq!(partition.positive.len(), 15);
    assert_eq!(partition.negative.len(), 22);
    assert_eq!(partition.total(), counts.total_images());

    let positive: HashSet<_> = partition.positive.iter().collect();
    assert!(partition.negative.iter().all(|path| !positive.contains(path)));
}

#[test]
fn materialized_partition_feeds_the_image_pipeline() {
    let temp = tempdir().unwrap();
    write_dataset(temp.path().join("data").as_path(), &[("a", 5), ("b", 5), ("c", 5)], 20);
    let mut work = WorkDir::temporary().unwrap();
    let partition = materialize(&temp.path().join("data"), label('a'), &mut work).unwrap();

    let plan = split_by_class(&partition.positive, &partition.negative, 0.2);
    assert_eq!(plan.validation.len(), 1 + 2);
    assert_eq!(plan.train.len(), 4 + 8);

    let images = load_image_set(&plan, 12);
    assert_eq!(images.skipped, 0);
    assert_eq!(images.count(BinaryClass::Positive), 5);
    assert!(
        images
            .train
            .iter()
            .chain(&images.validation)
            .all(|sample| sample.raster.width == 12 && sample.raster.pixels.len() == 12 * 12 * 3)
    );
}

#[test]
fn rerun_reproduces_partition_and_missing_label_leaves_work_dir_empty() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("data");
    write_dataset(&root, &[("a", 3), ("c", 4)], 8);
    let mut work = WorkDir::at(temp.path().join("work"));

    let first = materialize(&root, label('a'), &mut work).unwrap();
    let second = materialize(&root, label('a'), &mut work).unwrap();
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.positive, second.positive);
    assert_eq!(first.negative, second.negative);

    let err = materialize(&root, label('b'), &mut work).unwrap_err();
    assert!(matches!(err, PartitionError::MissingLabelDirectory { .. }));
    for dir in [work.positive_dir(), work.negative_dir()] {
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .map(|entries| entries.flatten().collect())
            .unwrap_or_default();
        assert!(leftovers.is_empty(), "{}: {leftovers:?}", dir.display());
    }
}
