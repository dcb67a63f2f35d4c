//! Ensemble aggregation over member pipeline outputs

use sei_algorithms::ensemble::{agreement_counts, attribution, difference, reduce_members, transition};
use sei_algorithms::habitat::{classify_deciles, collapse3, DecileThresholds};
use sei_core::{Error, Raster, RasterStack, Result};
use tracing::{info, warn};

use crate::config::MissingMemberPolicy;
use crate::products::{EnsembleOutput, MemberProducts, PipelineOutput};
use crate::scenario::ScenarioMetadata;

/// Parameters of one aggregation
#[derive(Debug, Clone)]
pub struct AggregateSettings {
    pub metadata: ScenarioMetadata,
    pub policy: MissingMemberPolicy,
    /// Change in `sei_mgmt` counted as substantial by the agreement bands
    pub substantial_change: f64,
    /// Used to classify the median/low/high composites
    pub thresholds: DecileThresholds,
}

/// Expected members that have no output, in expected order
pub fn missing_members(expected: &[String], members: &[&PipelineOutput]) -> Vec<String> {
    expected
        .iter()
        .filter(|name| !members.iter().any(|m| &m.metadata.member == *name))
        .cloned()
        .collect()
}

/// Reduce member outputs against the baseline.
///
/// Under `Refuse` any missing member fails the aggregation; under
/// `Partial` the available members are reduced as long as there are at
/// least `min_members` of them. Either way the error lists the missing
/// members, and the member outputs themselves are untouched.
pub fn aggregate(
    baseline: &PipelineOutput,
    members: &[&PipelineOutput],
    expected: &[String],
    settings: &AggregateSettings,
) -> Result<EnsembleOutput> {
    let missing = missing_members(expected, members);
    match settings.policy {
        MissingMemberPolicy::Refuse if !missing.is_empty() => {
            return Err(Error::Ensemble {
                reason: format!(
                    "'{}' has {} of {} members",
                    settings.metadata.scenario_id,
                    members.len(),
                    expected.len()
                ),
                missing,
            });
        }
        MissingMemberPolicy::Partial { min_members } if members.len() < min_members.max(1) => {
            return Err(Error::Ensemble {
                reason: format!(
                    "'{}' has {} members, at least {} required",
                    settings.metadata.scenario_id,
                    members.len(),
                    min_members
                ),
                missing,
            });
        }
        _ => {}
    }
    if !missing.is_empty() {
        warn!(
            scenario = %settings.metadata.scenario_id,
            missing = ?missing,
            "Aggregating a partial ensemble"
        );
    }
    info!(
        scenario = %settings.metadata.scenario_id,
        members = members.len(),
        "Aggregating ensemble"
    );

    let base_index = baseline.sei_mgmt()?;
    let base_class3 = baseline.class3()?;
    let indices: Vec<&Raster<f64>> = members.iter().map(|m| m.sei_mgmt()).collect::<Result<_>>()?;

    let stats = reduce_members(&indices).map_err(|e| with_missing(e, &missing))?;
    let agreement = agreement_counts(base_index, &stats.median, &indices, settings.substantial_change)?;

    let mut bands = RasterStack::new();
    for (name, reduced) in [("median", &stats.median), ("low", &stats.low), ("high", &stats.high)] {
        let class3 = collapse3(&classify_deciles(reduced, &settings.thresholds)?)?;
        bands.add_band(name, reduced.clone())?;
        bands.add_band(format!("{}_diff", name), difference(reduced, base_index)?)?;
        bands.add_band(format!("{}_transition", name), transition(base_class3, &class3)?)?;
    }
    bands.add_band("agree_direction", agreement.direction)?;
    bands.add_band("agree_increase", agreement.substantial_increase)?;
    bands.add_band("agree_decrease", agreement.substantial_decrease)?;

    let base_components = baseline.core_components()?;
    let member_products = members
        .iter()
        .map(|m| {
            let attr = attribution(&base_components, &m.core_components()?)?;
            let bands = RasterStack::new()
                .with_band("diff", difference(m.sei_mgmt()?, base_index)?)?
                .with_band("transition", transition(base_class3, m.class3()?)?)?
                .with_band("attr_sage", attr.sage)?
                .with_band("attr_perennial", attr.perennial)?
                .with_band("attr_annual", attr.annual)?;
            Ok(MemberProducts {
                member: m.metadata.member.clone(),
                bands,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EnsembleOutput {
        metadata: settings.metadata.clone(),
        members: members.iter().map(|m| m.metadata.member.clone()).collect(),
        missing,
        bands,
        member_products,
    })
}

fn with_missing(err: Error, missing: &[String]) -> Error {
    match err {
        Error::Ensemble { reason, .. } => Error::Ensemble {
            reason,
            missing: missing.to_vec(),
        },
        other => other,
    }
}
