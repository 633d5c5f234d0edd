//! Section allocation tests across packages and threads.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use db2_client::section::{LARGE_PACKAGE_SECTIONS, SMALL_PACKAGE_SECTIONS};
use db2_client::{Config, Error, SectionLayout, SectionManager};
use proptest::prelude::*;

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn test_default_layout_capacity() {
    let manager = SectionManager::new();
    let total = 3 * usize::from(SMALL_PACKAGE_SECTIONS) + 3 * usize::from(LARGE_PACKAGE_SECTIONS);

    let sections: Vec<_> = (0..total)
        .map(|_| manager.get_dynamic_section().unwrap())
        .collect();
    let unique: HashSet<_> = sections
        .iter()
        .map(|s| (s.package_name().to_string(), s.number()))
        .collect();
    assert_eq!(unique.len(), total);

    let err = manager.get_dynamic_section().unwrap_err();
    assert!(Error::from(err).is_resource_exhausted());
}

#[test]
fn test_zos_layout_capacity() {
    let manager = SectionManager::new();
    manager.configure_for_zos();
    let total = 3 * usize::from(LARGE_PACKAGE_SECTIONS);
    for _ in 0..total {
        let section = manager.get_dynamic_section().unwrap();
        assert!(section.package_name().starts_with("SYSLH"));
    }
    assert!(manager.get_dynamic_section().unwrap_err().is_exhausted());
}

#[test]
fn test_shared_manager_through_config() {
    let shared = Arc::new(SectionManager::with_layout(SectionLayout {
        small_packages: 1,
        large_packages: 0,
    }));
    let a = Config::new().section_manager(Arc::clone(&shared));
    let b = Config::new().section_manager(Arc::clone(&shared));

    let first = a.section_manager.as_ref().unwrap().get_dynamic_section().unwrap();
    let second = b.section_manager.as_ref().unwrap().get_dynamic_section().unwrap();
    assert_eq!(first.number(), 1);
    assert_eq!(second.number(), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_use_and_release() {
    let manager = Arc::new(SectionManager::with_layout(SectionLayout {
        small_packages: 1,
        large_packages: 0,
    }));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let section = match manager.get_dynamic_section() {
                        Ok(section) => section,
                        Err(e) => {
                            assert!(e.is_exhausted());
                            continue;
                        }
                    };
                    section.mark_in_use().expect("section handed out twice");
                    section.release().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let package = manager.get_dynamic_section().unwrap().package().clone();
    assert!(package.allocated_count() <= SMALL_PACKAGE_SECTIONS);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Any interleaving of takes and releases never hands out a section that
    /// is still in use.
    #[test]
    fn prop_no_section_handed_out_twice(ops in proptest::collection::vec(any::<bool>(), 1..400)) {
        let manager = SectionManager::with_layout(SectionLayout {
            small_packages: 1,
            large_packages: 1,
        });
        let mut held = Vec::new();
        let mut live = HashSet::new();

        for take in ops {
            if take || held.is_empty() {
                match manager.get_dynamic_section() {
                    Ok(section) => {
                        section.mark_in_use().unwrap();
                        let key = (section.package_name().to_string(), section.number());
                        prop_assert!(live.insert(key));
                        held.push(section);
                    }
                    Err(e) => prop_assert!(e.is_exhausted()),
                }
            } else if let Some(section) = held.pop() {
                live.remove(&(section.package_name().to_string(), section.number()));
                section.release().unwrap();
            }
        }
    }

    /// Released sections are reused before new numbers are allocated.
    #[test]
    fn prop_release_then_take_reuses(count in 1usize..65) {
        let manager = SectionManager::with_layout(SectionLayout {
            small_packages: 1,
            large_packages: 0,
        });
        let sections: Vec<_> = (0..count)
            .map(|_| manager.get_dynamic_section().unwrap())
            .collect();
        for section in &sections {
            section.mark_in_use().unwrap();
        }
        let last = sections.last().unwrap();
        last.release().unwrap();

        let next = manager.get_dynamic_section().unwrap();
        prop_assert_eq!(next.number(), last.number());
    }
}
