//! Shape attribute tables and vertex lists.

use xsi_math::Vec4;

use super::loader::XsiLoader;
use super::scanner::{ParseError, ParseResult};
use super::types::{Attribute, AttributeKind};

/// Attributes of one mesh, addressed by name.
#[derive(Debug, Default)]
pub(super) struct AttributeTable {
    pub attributes: Vec<Attribute>,
}

impl AttributeTable {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn get(&self, index: usize) -> &Attribute {
        &self.attributes[index]
    }
}

impl XsiLoader<'_> {
    /// `XSI_Shape name { "ORDERED", XSI_SubComponentAttributeList* }`
    ///
    /// Spatial attributes have Z mirrored here, so everything built from the
    /// table is already in output space.
    pub(super) fn parse_shape(&mut self) -> ParseResult<AttributeTable> {
        self.scan.expect_name("XSI_Shape")?;
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;
        if self.scan.scan_string()? != "ORDERED" {
            return Err(self.scan.error("shape must be ORDERED"));
        }

        let mut table = AttributeTable::default();
        while self.scan.if_name("XSI_SubComponentAttributeList")? {
            let name = self.scan.scan_xsi_name()?;
            self.scan.expect_punct('{')?;
            let usage = self.scan.scan_string()?;
            let ty = self.scan.scan_string()?;
            let Some(kind) = AttributeKind::classify(&usage, &ty, &name) else {
                return Err(self.scan.error(format!(
                    "unknown XSI_SubComponentAttributeList {usage} / {ty}"
                )));
            };

            let count = self.scan.scan_count()?;
            let mut data = Vec::new();
            for _ in 0..count {
                let mut value = Vec4::ZERO;
                for c in 0..kind.components() {
                    value[c] = self.scan.scan_float()?;
                }
                if kind.is_spatial() {
                    value.z *= self.mirror.sign();
                }
                if kind == AttributeKind::Position {
                    value.w = 1.0;
                }
                data.push(value);
            }
            self.scan.expect_punct('}')?;

            log::trace!("Attribute {} ({:?}, {} elements)", name, kind, count);
            table.attributes.push(Attribute { name, kind, data });
        }
        self.scan.expect_punct('}')?;
        Ok(table)
    }

    /// `XSI_VertexList { columns, "position", names…, count, rows }`
    ///
    /// Returns the position attribute and, per vertex-list entry, its index
    /// into that attribute. Extra columns (weight maps) are ignored.
    pub(super) fn parse_vertex_list(
        &mut self,
        table: &AttributeTable,
    ) -> ParseResult<(usize, Vec<u32>)> {
        self.scan.expect_name("XSI_VertexList")?;
        self.scan.expect_punct('{')?;

        let columns = self.scan.scan_count()?;
        if columns == 0 {
            return Err(self.scan.error("vertex list without columns"));
        }
        let name = self.scan.scan_string()?;
        self.scan.skip_strings(columns - 1)?;

        let position = match table.find(&name) {
            Some(index) if table.get(index).kind == AttributeKind::Position => index,
            Some(_) => {
                return Err(self
                    .scan
                    .error(format!("attribute {name} should be of type position")))
            }
            None => return Err(self.scan.error(format!("could not find attribute {name}"))),
        };
        let positions = table.get(position).data.len();

        let count = self.scan.scan_count()?;
        let mut map = Vec::new();
        for _ in 0..count {
            let line = self.scan.line();
            let index = self.scan.scan_int()?;
            self.scan.skip_ints(columns - 1)?;
            match usize::try_from(index) {
                Ok(i) if i < positions => map.push(i as u32),
                _ => {
                    return Err(ParseError::Syntax {
                        line,
                        message: format!("position index {index} out of range ({positions})"),
                    })
                }
            }
        }
        self.scan.expect_punct('}')?;
        Ok((position, map))
    }
}
