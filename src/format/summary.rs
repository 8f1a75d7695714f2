use crate::family::Family;

use super::RenderContext;

/// `<ACC>.<VER> '<NAME>': <classification> len=<N>` (spec.md §4.7).
pub fn render(family: &Family, _ctx: &RenderContext) -> String {
    let version = family.accession.version.unwrap_or(1);
    let name = family.name.as_deref().unwrap_or("");
    let len = family.length.unwrap_or_else(|| {
        family
            .consensus
            .as_ref()
            .map(|c| c.len() as u64)
            .unwrap_or(0)
    });
    format!(
        "{}.{} '{}': {} len={}",
        family.accession.unversioned(),
        version,
        name,
        family.classification,
        len
    )
}
