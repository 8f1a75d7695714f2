use crate::error::{Error, Result};
use crate::family::Family;

use super::RenderContext;

#[derive(Debug, Clone, Copy)]
pub enum EmblMode {
    Full,
    MetaOnly,
    SeqOnly,
}

fn wrap_at(text: &str, width: usize, prefix: &str) -> Vec<String> {
    let words = text.split_whitespace();
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in words {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(format!("{prefix}{current}"));
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(format!("{prefix}{current}"));
    }
    lines
}

fn base_counts(seq: &str) -> (usize, usize, usize, usize, usize) {
    let (mut a, mut c, mut g, mut t, mut other) = (0, 0, 0, 0, 0);
    for ch in seq.chars() {
        match ch {
            'A' => a += 1,
            'C' => c += 1,
            'G' => g += 1,
            'T' => t += 1,
            _ => other += 1,
        }
    }
    (a, c, g, t, other)
}

fn sequence_block(seq: &str) -> Vec<String> {
    let (a, c, g, t, other) = base_counts(seq);
    let mut out = vec![format!(
        "SQ   Sequence {} BP; {} A; {} C; {} G; {} T; {} other;",
        seq.len(),
        a,
        c,
        g,
        t,
        other
    )];
    let lower = seq.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let end = (pos + 60).min(bytes.len());
        let chunk = &bytes[pos..end];
        let mut groups = Vec::new();
        for group in chunk.chunks(10) {
            groups.push(String::from_utf8_lossy(group).into_owned());
        }
        let body = groups.join(" ");
        out.push(format!("     {body:<65}{}", end));
        pos = end;
    }
    out.push("//".to_string());
    out
}

pub fn render(family: &Family, ctx: &RenderContext, mode: EmblMode) -> Result<Vec<u8>> {
    let mut lines = Vec::new();
    let version = family.accession.version.unwrap_or(1);

    lines.push(format!(
        "ID   {}; SV {}; linear; DNA; STD; UNC; {} BP.",
        family.accession.unversioned(),
        version,
        family.length.unwrap_or(0)
    ));

    if !matches!(mode, EmblMode::SeqOnly) {
        if let Some(name) = &family.name {
            lines.push(format!("NM   {name}"));
        }
        lines.push(format!("AC   {};", family.accession.unversioned()));
        if let Some(desc) = &family.description {
            for line in wrap_at(desc, 75, "DE   ") {
                lines.push(line);
            }
        }
        lines.push(format!("DR   Dfam; {}.", family.accession.unversioned()));
        lines.push(format!("KW   {}.", family.rm.rm_type.clone().unwrap_or_default()));

        if !ctx.organism_name.is_empty() {
            lines.push(format!("OS   {}", ctx.organism_name));
        }
        if !ctx.lineage_names.is_empty() {
            let oc_text = format!("{};", ctx.lineage_names.join("; "));
            for line in wrap_at(&oc_text, 75, "OC   ") {
                lines.push(line);
            }
        }

        for (index, citation) in family.citations.iter().enumerate() {
            lines.push(format!("RN   [{}]", index + 1));
            lines.push(format!("RA   {};", citation.authors));
            lines.push(format!("RT   \"{}\";", citation.title));
            lines.push(format!("RL   {}.", citation.journal));
        }

        lines.push("CC   -------------------------------------------------------------------".to_string());
        if let Some(desc) = &family.description {
            for line in wrap_at(desc, 75, "CC   ") {
                lines.push(line);
            }
        }
        lines.push("CC   RepeatMasker Annotations:".to_string());
        if let Some(rm_type) = &family.rm.rm_type {
            lines.push(format!("CC        Type: {rm_type}"));
        }
        if let Some(subtype) = &family.rm.subtype {
            lines.push(format!("CC        SubType: {subtype}"));
        }
        if !family.rm.search_stages.is_empty() {
            let stages: Vec<String> = family.rm.search_stages.iter().map(|s| s.to_string()).collect();
            lines.push(format!("CC        Search Stages: {}", stages.join(",")));
        }
        if !family.rm.buffer_stages.is_empty() {
            let stages: Vec<String> = family
                .rm
                .buffer_stages
                .iter()
                .map(|b| format!("{}[{}:{}]", b.stage, b.start, b.end))
                .collect();
            lines.push(format!("CC        Buffer Stages: {}", stages.join(",")));
        }
        lines.push("CC   -------------------------------------------------------------------".to_string());
    }

    if !matches!(mode, EmblMode::MetaOnly) {
        let consensus = family
            .consensus
            .as_ref()
            .ok_or_else(|| Error::data(format!("family {} has no consensus sequence", family.accession)))?;
        lines.extend(sequence_block(consensus));
    } else {
        lines.push("//".to_string());
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out.into_bytes())
}
