use crate::error::Result;
use crate::family::{wrap_sequence, Family};

use super::RenderContext;

#[derive(Debug, Clone, Copy)]
pub enum HeaderStyle {
    Name,
    Accession,
}

fn class_suffix(family: &Family, ctx: &RenderContext) -> String {
    if !ctx.include_class_in_name {
        return String::new();
    }
    match (&family.rm.rm_type, &family.rm.subtype) {
        (Some(t), Some(s)) => format!("#{t}/{s}"),
        (Some(t), None) => format!("#{t}"),
        _ => String::new(),
    }
}

fn stage_tag(family: &Family) -> String {
    if family.rm.search_stages.is_empty() {
        String::new()
    } else {
        let stages: Vec<String> = family.rm.search_stages.iter().map(|s| s.to_string()).collect();
        format!(" [S:{}]", stages.join(","))
    }
}

fn header(family: &Family, ctx: &RenderContext, style: HeaderStyle, suffix: &str) -> String {
    let fallback = family.accession.unversioned();
    let name = family.name.as_deref().unwrap_or(&fallback);
    let class = class_suffix(family, ctx);
    let stages = stage_tag(family);
    let body = match style {
        HeaderStyle::Name => format!("{name}{class}"),
        HeaderStyle::Accession => {
            let version = family.accession.version.unwrap_or(1);
            format!(
                "{}.{}{} name={}",
                family.accession.unversioned(),
                version,
                class,
                name
            )
        }
    };
    format!(">{}{} @{}{}", body, suffix, ctx.display_clade, stages)
}

/// Reverse-complements an upper-case DNA sequence, leaving any non-ACGT
/// character (ambiguity codes, N) as itself.
fn reverse_complement(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            other => other,
        })
        .collect()
}

pub fn render(family: &Family, ctx: &RenderContext, style: HeaderStyle) -> Result<Vec<u8>> {
    let consensus = family.consensus.clone().unwrap_or_default();
    let mut out = String::new();
    out.push_str(&header(family, ctx, style, ""));
    out.push('\n');
    for line in wrap_sequence(&consensus, 60) {
        out.push_str(&line);
        out.push('\n');
    }
    if ctx.reverse_complement {
        out.push_str(&header(family, ctx, style, "_RC"));
        out.push('\n');
        for line in wrap_sequence(&reverse_complement(&consensus), 60) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    Ok(out.into_bytes())
}
