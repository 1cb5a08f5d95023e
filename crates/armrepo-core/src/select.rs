//! Allow-list filtering of decoded index entries.

use std::collections::HashSet;

use armrepo_schema::{AllowList, PackageDescriptor};

/// Whether a descriptor's package name is on the allow-list.
///
/// Exact, case-sensitive name equality. The artifact file name plays no part.
pub fn is_wanted(descriptor: &PackageDescriptor, allow: &AllowList) -> bool {
    allow.contains(&descriptor.name)
}

/// The wanted subset of `descriptors`, in input order.
pub fn select<'a, I>(descriptors: I, allow: &'a AllowList) -> impl Iterator<Item = &'a PackageDescriptor>
where
    I: IntoIterator<Item = &'a PackageDescriptor>,
    I::IntoIter: 'a,
{
    descriptors.into_iter().filter(move |d| is_wanted(d, allow))
}

/// Allow-list names for which no descriptor was seen, in allow-list order.
pub fn unmatched<'a>(allow: &'a AllowList, seen: &HashSet<&str>) -> Vec<&'a str> {
    allow.iter().filter(|name| !seen.contains(name)).collect()
}
