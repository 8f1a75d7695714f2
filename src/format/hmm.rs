use crate::error::{Error, Result};
use crate::family::{Family, GeneralThreshold, SpeciesThreshold};

use super::RenderContext;

fn set_field(lines: &mut Vec<String>, tag: &str, value: &str) {
    let padded_tag = format!("{tag:<6}");
    if let Some(line) = lines.iter_mut().find(|l| l.split_whitespace().next() == Some(tag)) {
        *line = format!("{padded_tag}{value}");
        return;
    }
    // NAME is always present in a well-formed HMMER payload; insert right
    // after it if the field was absent.
    let insert_at = lines
        .iter()
        .position(|l| l.split_whitespace().next() == Some("NAME"))
        .map(|i| i + 1)
        .unwrap_or(lines.len());
    lines.insert(insert_at, format!("{padded_tag}{value}"));
}

fn remove_tag(lines: &mut Vec<String>, tag: &str) {
    lines.retain(|l| l.split_whitespace().next() != Some(tag));
}

fn format_general_threshold(gt: &GeneralThreshold) -> (String, String, String) {
    (
        format!("{:.2}", gt.ga),
        format!("{:.2}", gt.tc),
        format!("{:.2}", gt.nc),
    )
}

fn th_line(t: &SpeciesThreshold) -> String {
    let fdr = t.fdr.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string());
    format!(
        "TH    TaxId:{}; TaxName:{}; GA:{:.2}; TC:{:.2}; NC:{:.2}; fdr:{};",
        t.taxon_id, t.taxon_name, t.ga, t.tc, t.nc, fdr
    )
}

/// Picks the threshold belonging to the nearest entry in
/// `species_ancestor_chain` (nearest first) that has one on record.
fn nearest_threshold<'a>(
    thresholds: &'a [SpeciesThreshold],
    chain: &[crate::taxonomy::TaxonId],
) -> Option<&'a SpeciesThreshold> {
    chain
        .iter()
        .find_map(|id| thresholds.iter().find(|t| t.taxon_id == *id))
}

pub fn render(family: &Family, ctx: &RenderContext, species_mode: bool) -> Result<Vec<u8>> {
    let hmm = family
        .hmm
        .as_ref()
        .ok_or_else(|| Error::data(format!("family {} has no HMM model", family.accession)))?;

    let text = String::from_utf8_lossy(&hmm.raw);
    let mut lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();

    let name = family.name.clone().unwrap_or_else(|| family.accession.unversioned());
    set_field(&mut lines, "NAME", &name);
    set_field(&mut lines, "ACC", &family.accession.to_string());
    if let Some(desc) = &family.description {
        set_field(&mut lines, "DESC", desc);
    }

    remove_tag(&mut lines, "CT");
    let ct_insert_at = lines
        .iter()
        .position(|l| l.trim() == "//")
        .unwrap_or(lines.len());
    lines.insert(ct_insert_at, format!("CT    {}", family.classification));

    remove_tag(&mut lines, "TH");

    if species_mode {
        remove_tag(&mut lines, "GA");
        remove_tag(&mut lines, "TC");
        remove_tag(&mut lines, "NC");
        if let Some(t) = nearest_threshold(&hmm.species_thresholds, &ctx.species_ancestor_chain) {
            set_field(&mut lines, "GA", &format!("{:.2} {:.2}", t.ga, t.ga));
            set_field(&mut lines, "TC", &format!("{:.2} {:.2}", t.tc, t.tc));
            set_field(&mut lines, "NC", &format!("{:.2} {:.2}", t.nc, t.nc));
        } else if let Some(gt) = &hmm.general_threshold {
            let (ga, tc, nc) = format_general_threshold(gt);
            set_field(&mut lines, "GA", &format!("{ga} {ga}"));
            set_field(&mut lines, "TC", &format!("{tc} {tc}"));
            set_field(&mut lines, "NC", &format!("{nc} {nc}"));
        }
    } else {
        let terminator = lines
            .iter()
            .position(|l| l.trim() == "//")
            .unwrap_or(lines.len());
        let th_lines: Vec<String> = hmm.species_thresholds.iter().map(th_line).collect();
        for (offset, line) in th_lines.into_iter().enumerate() {
            lines.insert(terminator + offset, line);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out.into_bytes())
}
