//! Skin envelopes binding model vertices to joints.

use super::loader::XsiLoader;
use super::scanner::ParseResult;
use super::types::Envelope;
use crate::mesh::Vertex;

/// Map a scoped reference such as `Scene.Arm` to its model name `MDL-Arm`.
fn model_name(reference: &str) -> String {
    match reference.split_once('.') {
        Some((_, rest)) => format!("MDL-{rest}"),
        None => reference.to_string(),
    }
}

impl XsiLoader<'_> {
    /// `SI_EnvelopeList { count, SI_Envelope name { model, joint, count, (vertex, weight)* }* }`
    ///
    /// Envelopes are only recorded here; [`Self::resolve_envelopes`] applies
    /// them once every model is known.
    pub(super) fn parse_envelope_list(&mut self) -> ParseResult<()> {
        self.scan.expect_punct('{')?;
        let count = self.scan.scan_count()?;
        for _ in 0..count {
            self.scan.expect_name("SI_Envelope")?;
            self.scan.scan_xsi_name()?;
            self.scan.expect_punct('{')?;
            let line = self.scan.line();
            let model = model_name(&self.scan.scan_string()?);
            let joint = model_name(&self.scan.scan_string()?);

            let pairs = self.scan.scan_count()?;
            let mut weights = Vec::new();
            for _ in 0..pairs {
                let vertex = self.scan.scan_int()?;
                let weight = self.scan.scan_float()?;
                match u32::try_from(vertex) {
                    Ok(vertex) => weights.push((vertex, weight)),
                    Err(_) => self.warn(format!(
                        "negative vertex index {vertex} in envelope <{joint}> skipped"
                    )),
                }
            }
            self.scan.expect_punct('}')?;

            self.envelopes.push(Envelope {
                model,
                joint,
                line,
                weights,
            });
        }
        self.scan.expect_punct('}')
    }

    /// Add every recorded envelope weight to the vertices built from the
    /// named source position, then normalize all weights.
    ///
    /// Envelopes naming an unknown joint or model are reported and skipped.
    pub(super) fn resolve_envelopes(&mut self) {
        let envelopes = std::mem::take(&mut self.envelopes);
        for envelope in &envelopes {
            let Some(joint) = self.skeleton.find(&envelope.joint) else {
                self.warn_at(
                    envelope.line,
                    format!("unknown skeleton model <{}>", envelope.joint),
                );
                continue;
            };
            let Some(model) = self.models.iter_mut().find(|m| m.name == envelope.model) else {
                self.warn_at(
                    envelope.line,
                    format!("envelope for unknown model <{}>", envelope.model),
                );
                continue;
            };

            for &(source, weight) in envelope.weights.iter().filter(|(_, w)| *w > 0.0) {
                for (vertex, &position) in model.mesh.vertices.iter_mut().zip(&model.position_map) {
                    if position == source {
                        vertex.add_weight(joint, weight);
                    }
                }
            }
        }

        for model in &mut self.models {
            model.mesh.vertices.iter_mut().for_each(Vertex::normalize_weights);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name() {
        assert_eq!(model_name("Scene.Arm"), "MDL-Arm");
        assert_eq!(model_name("Scene.Rig.Hand"), "MDL-Rig.Hand");
        assert_eq!(model_name("MDL-Arm"), "MDL-Arm");
    }
}
