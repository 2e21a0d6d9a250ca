use heillern_core::config::ActionSpaceConfig;
use heillern_core::{ActionCatalog, ActionCategory, CoreError};

fn spaces() -> Vec<ActionSpaceConfig> {
    vec![
        ActionSpaceConfig::default(),
        ActionSpaceConfig {
            num_nutrients: 2,
            num_exercises: 0,
            num_sleep_patterns: 5,
            num_lifestyle: 1,
        },
        ActionSpaceConfig {
            num_nutrients: 0,
            num_exercises: 0,
            num_sleep_patterns: 0,
            num_lifestyle: 3,
        },
    ]
}

#[test]
fn every_valid_index_roundtrips() {
    for space in spaces() {
        let catalog = ActionCatalog::new(&space);
        for index in 0..catalog.total() {
            let action = catalog
                .index_to_action(index, 0.5)
                .unwrap_or_else(|e| panic!("index {index} should map: {e}"));
            let back = catalog
                .action_to_index(&action)
                .unwrap_or_else(|e| panic!("action for {index} should map back: {e}"));
            assert_eq!(back, index);
        }
    }
}

#[test]
fn ranges_partition_the_action_space() {
    for space in spaces() {
        let catalog = ActionCatalog::new(&space);
        let mut covered = vec![0_u32; catalog.total()];
        let mut expected_start = 0;
        for category in ActionCategory::ALL {
            let range = catalog.range(category);
            assert_eq!(range.start, expected_start, "ranges must be contiguous");
            expected_start = range.end;
            for i in range {
                covered[i] += 1;
            }
        }
        assert_eq!(expected_start, space.total());
        assert!(covered.iter().all(|&c| c == 1), "each index in exactly one range");
    }
}

#[test]
fn index_at_total_is_out_of_range() {
    let space = ActionSpaceConfig::default();
    let catalog = ActionCatalog::new(&space);
    assert!(matches!(
        catalog.locate(space.total()),
        Err(CoreError::ActionIndexOutOfRange { .. })
    ));
}
