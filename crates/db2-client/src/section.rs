//! Section and package allocation.
//!
//! Every statement a DB2 server executes runs in a *section* of a bound
//! package. Dynamic SQL uses the packages of the standard client package set:
//! small packages (`SYSSH2xx`, 65 sections) and large packages (`SYSLH2xx`,
//! 385 sections), both with cursors held over commit. A separate static
//! package `SYSSTAT` provides the section used for immediate execution.
//!
//! ## Lifecycle
//!
//! ```text
//! get_free_section() -> mark_in_use() -> release() -> (free list) -> ...
//! ```
//!
//! A section handed out and never used is released the same way.
//!
//! A [`SectionManager`] is shared between connections as an
//! `Arc<SectionManager>`. Free lists are lock-free so sections can be taken and
//! returned from any task.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use crossbeam_queue::ArrayQueue;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

/// Sections in a small package.
pub const SMALL_PACKAGE_SECTIONS: u16 = 65;

/// Sections in a large package.
pub const LARGE_PACKAGE_SECTIONS: u16 = 385;

/// Name of the static package.
pub const STATIC_PACKAGE_NAME: &str = "SYSSTAT";

/// Section number used for immediate execution in the static package.
pub const IMMEDIATE_SECTION_NUMBER: u16 = 1;

/// Errors raised by section allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SectionError {
    /// The section is already in use by another statement.
    #[error("section {number} of {package} is already in use")]
    InUse {
        /// Package name.
        package: String,
        /// Section number.
        number: u16,
    },

    /// The section was already returned to its package.
    #[error("section {number} of {package} is already released")]
    AlreadyReleased {
        /// Package name.
        package: String,
        /// Section number.
        number: u16,
    },

    /// Every section of every package is allocated.
    #[error("all sections of {packages} packages are in use")]
    Exhausted {
        /// Number of packages tried.
        packages: usize,
    },
}

impl SectionError {
    /// Whether this error signals exhaustion rather than misuse.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Size class of a dynamic package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageSize {
    /// 65 sections.
    Small,
    /// 385 sections.
    Large,
}

impl PackageSize {
    /// Number of sections in a package of this size.
    #[must_use]
    pub const fn capacity(self) -> u16 {
        match self {
            Self::Small => SMALL_PACKAGE_SECTIONS,
            Self::Large => LARGE_PACKAGE_SECTIONS,
        }
    }

    const fn letter(self) -> char {
        match self {
            Self::Small => 'S',
            Self::Large => 'L',
        }
    }
}

// Section slot states.
const SLOT_FREE: u8 = 0;
const SLOT_HANDED_OUT: u8 = 1;
const SLOT_IN_USE: u8 = 2;

/// A bound package with a fixed number of sections.
pub struct Db2Package {
    name: String,
    size: Option<PackageSize>,
    capacity: u16,
    cursor_prefix: String,
    next_section: AtomicU16,
    free: ArrayQueue<u16>,
    slots: Box<[AtomicU8]>,
}

impl Db2Package {
    /// Create the dynamic package `SYS{S|L}H2{sequence:02}`.
    #[must_use]
    pub fn dynamic(size: PackageSize, sequence: u8) -> Arc<Self> {
        let name = format!("SYS{}H2{:02}", size.letter(), sequence % 100);
        Arc::new(Self::with_name(name, Some(size), size.capacity()))
    }

    /// Create the static package holding the immediate section.
    #[must_use]
    pub fn static_package() -> Arc<Self> {
        Arc::new(Self::with_name(
            STATIC_PACKAGE_NAME.to_string(),
            None,
            IMMEDIATE_SECTION_NUMBER,
        ))
    }

    fn with_name(name: String, size: Option<PackageSize>, capacity: u16) -> Self {
        // SYSSH200 -> SQL_CURSH200C
        let cursor_prefix = format!("SQL_CUR{}C", name.get(3..).unwrap_or(&name));
        Self {
            name,
            size,
            capacity,
            cursor_prefix,
            next_section: AtomicU16::new(1),
            free: ArrayQueue::new(usize::from(capacity.max(1))),
            slots: (0..=capacity).map(|_| AtomicU8::new(SLOT_FREE)).collect(),
        }
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size class, `None` for the static package.
    #[must_use]
    pub fn size(&self) -> Option<PackageSize> {
        self.size
    }

    /// Number of sections in the package.
    #[must_use]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Sections released and waiting to be reused.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Sections handed out so far, reused ones included once.
    #[must_use]
    pub fn allocated_count(&self) -> u16 {
        self.next_section
            .load(Ordering::Acquire)
            .saturating_sub(1)
            .min(self.capacity)
    }

    /// Cursor name of a section, for example `SQL_CURSH200C1`.
    #[must_use]
    pub fn cursor_name(&self, number: u16) -> String {
        format!("{}{}", self.cursor_prefix, number)
    }

    /// Take a free section: a released one if any, otherwise the next
    /// unallocated number. `None` when the package is full.
    pub fn get_free_section(self: &Arc<Self>) -> Option<Section> {
        let number = match self.free.pop() {
            Some(number) => number,
            None => self
                .next_section
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                    (next <= self.capacity).then_some(next + 1)
                })
                .ok()?,
        };
        if self
            .slot(number)
            .compare_exchange(SLOT_FREE, SLOT_HANDED_OUT, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(package = %self.name, number, "section handed out while not free");
        }
        Some(self.section(number))
    }

    fn section(self: &Arc<Self>, number: u16) -> Section {
        Section {
            package: Arc::clone(self),
            number,
            cursor_name: self.cursor_name(number),
            client_cursor_name: None,
            positioned_update_cursor_name: None,
            immediate: false,
        }
    }

    fn slot(&self, number: u16) -> &AtomicU8 {
        // Section numbers are always within 1..=capacity.
        &self.slots[usize::from(number.min(self.capacity))]
    }

    fn free_section(&self, number: u16) {
        if self.free.push(number).is_err() {
            tracing::warn!(package = %self.name, number, "section free list is full");
        }
    }
}

impl fmt::Debug for Db2Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db2Package")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("allocated", &self.allocated_count())
            .field("free", &self.free.len())
            .finish()
    }
}

/// A section handed out by a package.
#[derive(Debug, Clone)]
pub struct Section {
    package: Arc<Db2Package>,
    number: u16,
    cursor_name: String,
    client_cursor_name: Option<String>,
    positioned_update_cursor_name: Option<String>,
    immediate: bool,
}

impl Section {
    /// Package the section belongs to.
    #[must_use]
    pub fn package(&self) -> &Arc<Db2Package> {
        &self.package
    }

    /// Name of the package the section belongs to.
    #[must_use]
    pub fn package_name(&self) -> &str {
        self.package.name()
    }

    /// Section number within its package, starting at 1.
    #[must_use]
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Server cursor name.
    #[must_use]
    pub fn cursor_name(&self) -> &str {
        &self.cursor_name
    }

    /// Cursor name the application chose, if any.
    #[must_use]
    pub fn client_cursor_name(&self) -> Option<&str> {
        self.client_cursor_name.as_deref()
    }

    /// Set the cursor name the application chose.
    pub fn set_client_cursor_name(&mut self, name: impl Into<String>) {
        self.client_cursor_name = Some(name.into());
    }

    /// Server cursor name of the query a positioned update refers to.
    #[must_use]
    pub fn positioned_update_cursor_name(&self) -> Option<&str> {
        self.positioned_update_cursor_name.as_deref()
    }

    /// Whether this is the shared immediate-execution section.
    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Whether the section is marked in use.
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.immediate || self.package.slot(self.number).load(Ordering::Acquire) == SLOT_IN_USE
    }

    /// Mark the section in use by a statement.
    ///
    /// The immediate section is shared and can always be used. A section
    /// already released cannot be marked again through a stale handle.
    pub fn mark_in_use(&self) -> Result<(), SectionError> {
        if self.immediate {
            return Ok(());
        }
        match self.package.slot(self.number).compare_exchange(
            SLOT_HANDED_OUT,
            SLOT_IN_USE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(SLOT_IN_USE) => Err(SectionError::InUse {
                package: self.package.name.clone(),
                number: self.number,
            }),
            Err(_) => Err(self.already_released()),
        }
    }

    /// Release the section back to its package. It is the next section the
    /// package hands out.
    ///
    /// A section that was handed out but never marked in use can be released
    /// too.
    pub fn release(&self) -> Result<(), SectionError> {
        if self.immediate {
            return Ok(());
        }
        self.package
            .slot(self.number)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state != SLOT_FREE).then_some(SLOT_FREE)
            })
            .map_err(|_| self.already_released())?;
        self.package.free_section(self.number);
        Ok(())
    }

    fn already_released(&self) -> SectionError {
        SectionError::AlreadyReleased {
            package: self.package.name.clone(),
            number: self.number,
        }
    }
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.package, &other.package) && self.number == other.number
    }
}

impl Eq for Section {}

/// Package layout of a [`SectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    /// Number of small packages (default: 3).
    pub small_packages: u8,
    /// Number of large packages (default: 3).
    pub large_packages: u8,
}

impl Default for SectionLayout {
    fn default() -> Self {
        Self {
            small_packages: 3,
            large_packages: 3,
        }
    }
}

/// Allocates sections across the configured packages.
pub struct SectionManager {
    packages: RwLock<Vec<Arc<Db2Package>>>,
    static_package: Arc<Db2Package>,
    positioned_cursors: Mutex<HashMap<String, Section>>,
}

impl SectionManager {
    /// Create a manager with the default layout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout(SectionLayout::default())
    }

    /// Create a manager with the given number of small and large packages.
    #[must_use]
    pub fn with_layout(layout: SectionLayout) -> Self {
        let small = (0..layout.small_packages).map(|i| Db2Package::dynamic(PackageSize::Small, i));
        let large = (0..layout.large_packages).map(|i| Db2Package::dynamic(PackageSize::Large, i));
        Self {
            packages: RwLock::new(small.chain(large).collect()),
            static_package: Db2Package::static_package(),
            positioned_cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Get a section for a dynamic statement from the first package with one
    /// free.
    pub fn get_dynamic_section(&self) -> Result<Section, SectionError> {
        let packages = self.packages.read();
        for package in packages.iter() {
            if let Some(section) = package.get_free_section() {
                tracing::trace!(
                    package = package.name(),
                    number = section.number(),
                    "allocated section"
                );
                return Ok(section);
            }
        }
        tracing::warn!(packages = packages.len(), "no free section in any package");
        Err(SectionError::Exhausted {
            packages: packages.len(),
        })
    }

    /// The shared immediate-execution section of the static package.
    #[must_use]
    pub fn immediate_section(&self) -> Section {
        let mut section = self.static_package.section(IMMEDIATE_SECTION_NUMBER);
        section.immediate = true;
        section
    }

    /// Drop the small packages, which DB2 for z/OS does not bind by default.
    /// The change is permanent for this manager.
    pub fn configure_for_zos(&self) {
        let mut packages = self.packages.write();
        let before = packages.len();
        packages.retain(|p| p.size() != Some(PackageSize::Small));
        if packages.len() != before {
            tracing::debug!(
                removed = before - packages.len(),
                "removed small packages for z/OS"
            );
        }
    }

    /// Names of the dynamic packages in allocation order.
    #[must_use]
    pub fn package_names(&self) -> Vec<String> {
        self.packages
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Remember the query section behind a cursor name for later positioned
    /// updates.
    pub fn map_cursor_name(&self, cursor_name: impl Into<String>, query_section: Section) {
        self.positioned_cursors
            .lock()
            .insert(cursor_name.into(), query_section);
    }

    /// Forget cursor mappings for a closed query.
    pub fn remove_cursor_mapping(
        &self,
        client_cursor_name: Option<&str>,
        server_cursor_name: Option<&str>,
    ) {
        let mut cursors = self.positioned_cursors.lock();
        for name in [client_cursor_name, server_cursor_name].into_iter().flatten() {
            cursors.remove(name);
        }
    }

    /// Get a section for `UPDATE ... WHERE CURRENT OF cursor_name`.
    ///
    /// The section comes from the same package as the query and carries the
    /// query's client and server cursor names. `Ok(None)` when no query is
    /// mapped to the name.
    pub fn positioned_update_section(
        &self,
        cursor_name: &str,
    ) -> Result<Option<Section>, SectionError> {
        let Some(query) = self.positioned_cursors.lock().get(cursor_name).cloned() else {
            return Ok(None);
        };
        let mut section = query
            .package
            .get_free_section()
            .ok_or(SectionError::Exhausted { packages: 1 })?;
        section.client_cursor_name = query.client_cursor_name.clone();
        section.positioned_update_cursor_name = Some(query.cursor_name.clone());
        Ok(Some(section))
    }
}

impl Default for SectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionManager")
            .field("packages", &*self.packages.read())
            .field("static_package", &self.static_package.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names() {
        let manager = SectionManager::new();
        assert_eq!(
            manager.package_names(),
            ["SYSSH200", "SYSSH201", "SYSSH202", "SYSLH200", "SYSLH201", "SYSLH202"]
        );
    }

    #[test]
    fn test_sequential_sections_until_full() {
        let package = Db2Package::dynamic(PackageSize::Small, 0);
        for expected in 1..=SMALL_PACKAGE_SECTIONS {
            let section = package.get_free_section().unwrap();
            assert_eq!(section.number(), expected);
        }
        assert!(package.get_free_section().is_none());
        assert_eq!(package.allocated_count(), SMALL_PACKAGE_SECTIONS);
    }

    #[test]
    fn test_released_section_is_next() {
        let package = Db2Package::dynamic(PackageSize::Large, 1);
        let first = package.get_free_section().unwrap();
        let second = package.get_free_section().unwrap();
        first.mark_in_use().unwrap();
        second.mark_in_use().unwrap();

        second.release().unwrap();
        assert_eq!(package.get_free_section().unwrap().number(), 2);
        assert_eq!(package.get_free_section().unwrap().number(), 3);
    }

    #[test]
    fn test_double_use_fails() {
        let package = Db2Package::dynamic(PackageSize::Small, 0);
        let section = package.get_free_section().unwrap();
        section.mark_in_use().unwrap();
        assert!(matches!(
            section.mark_in_use().unwrap_err(),
            SectionError::InUse { number: 1, .. }
        ));
    }

    #[test]
    fn test_double_release_fails() {
        let package = Db2Package::dynamic(PackageSize::Small, 0);
        let section = package.get_free_section().unwrap();
        section.mark_in_use().unwrap();
        section.release().unwrap();
        assert!(matches!(
            section.release().unwrap_err(),
            SectionError::AlreadyReleased { number: 1, .. }
        ));
        assert_eq!(package.free_count(), 1);
    }

    #[test]
    fn test_release_without_use() {
        let package = Db2Package::dynamic(PackageSize::Small, 0);
        let section = package.get_free_section().unwrap();
        assert!(!section.is_in_use());
        section.release().unwrap();
        assert_eq!(package.free_count(), 1);

        assert!(matches!(
            section.release().unwrap_err(),
            SectionError::AlreadyReleased { number: 1, .. }
        ));
        assert_eq!(package.free_count(), 1);

        let reused = package.get_free_section().unwrap();
        assert_eq!(reused.number(), section.number());
        reused.mark_in_use().unwrap();
    }

    #[test]
    fn test_stale_handle_cannot_mark() {
        let package = Db2Package::dynamic(PackageSize::Small, 0);
        let section = package.get_free_section().unwrap();
        section.mark_in_use().unwrap();
        section.release().unwrap();
        assert!(matches!(
            section.mark_in_use().unwrap_err(),
            SectionError::AlreadyReleased { number: 1, .. }
        ));
    }

    #[test]
    fn test_cursor_names() {
        let package = Db2Package::dynamic(PackageSize::Large, 2);
        let section = package.get_free_section().unwrap();
        assert_eq!(section.package_name(), "SYSLH202");
        assert_eq!(section.cursor_name(), "SQL_CURLH202C1");
    }

    #[test]
    fn test_manager_moves_to_next_package() {
        let manager = SectionManager::with_layout(SectionLayout {
            small_packages: 1,
            large_packages: 1,
        });
        for _ in 0..SMALL_PACKAGE_SECTIONS {
            assert_eq!(manager.get_dynamic_section().unwrap().package_name(), "SYSSH200");
        }
        let section = manager.get_dynamic_section().unwrap();
        assert_eq!(section.package_name(), "SYSLH200");
        assert_eq!(section.number(), 1);
    }

    #[test]
    fn test_manager_exhausted() {
        let manager = SectionManager::with_layout(SectionLayout {
            small_packages: 1,
            large_packages: 0,
        });
        let sections: Vec<_> = (0..SMALL_PACKAGE_SECTIONS)
            .map(|_| manager.get_dynamic_section().unwrap())
            .collect();
        let err = manager.get_dynamic_section().unwrap_err();
        assert!(err.is_exhausted());

        sections[10].mark_in_use().unwrap();
        sections[10].release().unwrap();
        assert_eq!(manager.get_dynamic_section().unwrap().number(), 11);
    }

    #[test]
    fn test_configure_for_zos_removes_small_packages() {
        let manager = SectionManager::new();
        manager.configure_for_zos();
        assert_eq!(manager.package_names(), ["SYSLH200", "SYSLH201", "SYSLH202"]);
        assert_eq!(manager.get_dynamic_section().unwrap().package_name(), "SYSLH200");

        manager.configure_for_zos();
        assert_eq!(manager.package_names().len(), 3);
    }

    #[test]
    fn test_immediate_section_is_shared() {
        let manager = SectionManager::new();
        let a = manager.immediate_section();
        let b = manager.immediate_section();
        assert!(a.is_immediate());
        assert_eq!(a.package_name(), STATIC_PACKAGE_NAME);
        a.mark_in_use().unwrap();
        b.mark_in_use().unwrap();
        a.release().unwrap();
        a.release().unwrap();
        assert!(b.is_in_use());
    }

    #[test]
    fn test_positioned_update_section() {
        let manager = SectionManager::new();
        let mut query = manager.get_dynamic_section().unwrap();
        query.set_client_cursor_name("MYCURSOR");
        manager.map_cursor_name("MYCURSOR", query.clone());

        let update = manager
            .positioned_update_section("MYCURSOR")
            .unwrap()
            .unwrap();
        assert_eq!(update.package_name(), query.package_name());
        assert_ne!(update.number(), query.number());
        assert_eq!(update.client_cursor_name(), Some("MYCURSOR"));
        assert_eq!(update.positioned_update_cursor_name(), Some("SQL_CURSH200C1"));

        assert!(manager.positioned_update_section("OTHER").unwrap().is_none());
        manager.remove_cursor_mapping(Some("MYCURSOR"), None);
        assert!(manager.positioned_update_section("MYCURSOR").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_allocation_hands_out_unique_sections() {
        let package = Db2Package::dynamic(PackageSize::Large, 0);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let package = Arc::clone(&package);
                std::thread::spawn(move || {
                    (0..96)
                        .filter_map(|_| package.get_free_section())
                        .map(|s| s.number())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=384).collect::<Vec<_>>());
    }
}
