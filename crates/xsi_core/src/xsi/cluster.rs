//! Mesh blocks: polygon lists fused into flat vertices and faces.
//!
//! Every polygon corner becomes its own vertex; identical corners are
//! collapsed later by [`Mesh::merge_vertices`]. The source position of each
//! vertex is recorded so envelopes can find it.

use xsi_math::Vec4;

use super::loader::XsiLoader;
use super::material::select_texture_spaces;
use super::scanner::{ParseError, ParseResult};
use super::shape::AttributeTable;
use super::types::{AttributeKind, MAX_COLORS, MAX_UVS};
use crate::mesh::{Cluster, Face, Mesh, Vertex};

/// Row columns feeding each vertex channel, as (column, attribute) pairs.
#[derive(Debug, Default)]
struct Channels {
    normal: Option<(usize, usize)>,
    tangent: Option<(usize, usize)>,
    colors: Vec<(usize, usize)>,
    uvs: Vec<(usize, usize)>,
}

/// A mesh being assembled from its polygon lists.
struct MeshBuild<'t> {
    model: &'t str,
    animated: bool,
    visible: bool,
    table: &'t AttributeTable,
    /// Position attribute of the vertex list
    position: usize,
    /// Vertex-list entry to position index
    vertex_list: &'t [u32],
    /// Bitangent sign factor; mirroring flips handedness
    handedness: f32,
    reverse_winding: bool,

    mesh: Mesh,
    position_map: Vec<u32>,
}

impl MeshBuild<'_> {
    /// Append one corner's vertex from a row of resolved indices.
    fn push_corner(&mut self, row: &[usize], channels: &Channels, uvs: &[(usize, usize)]) {
        let source = self.vertex_list[row[0]];
        let table = self.table;
        let fetch = |(column, attribute): (usize, usize)| table.get(attribute).data[row[column]];

        let mut v = Vertex::at(table.get(self.position).data[source as usize].truncate());
        if let Some(normal) = channels.normal {
            v.normal = fetch(normal).truncate().to_array();
        }
        if let Some(tangent) = channels.tangent {
            let t = fetch(tangent);
            v.tangent = t.truncate().to_array();
            let sign = if t.w < 0.0 { -1.0 } else { 1.0 };
            v.bitangent_sign = sign * self.handedness;
        }

        let mut colors = channels.colors.iter().map(|&c| rgba8(fetch(c)));
        if let Some(color) = colors.next() {
            v.color0 = color;
        }
        if let Some(color) = colors.next() {
            v.color1 = color;
        }

        let mut coords = uvs.iter().map(|&uv| {
            let d = fetch(uv);
            [d.x, 1.0 - d.y]
        });
        if let Some(uv) = coords.next() {
            v.uv0 = uv;
        }
        if let Some(uv) = coords.next() {
            v.uv1 = uv;
        }

        self.mesh.vertices.push(v);
        self.position_map.push(source);
    }

    /// Faces over the `corners` vertices starting at `base`.
    ///
    /// Triangles and quads stay whole; larger polygons fan out from their
    /// first corner.
    fn push_faces(&mut self, base: u32, corners: u32, cluster: usize) {
        if corners <= 4 {
            let mut ids = [0u32; 4];
            for (i, id) in ids.iter_mut().take(corners as usize).enumerate() {
                *id = base + i as u32;
            }
            if self.reverse_winding {
                ids[..corners as usize].reverse();
            }
            let face = if corners == 3 {
                Face::triangle(ids[0], ids[1], ids[2], cluster)
            } else {
                Face::quad(ids[0], ids[1], ids[2], ids[3], cluster)
            };
            self.mesh.faces.push(face);
            return;
        }

        for i in 2..corners {
            let (a, b, c) = (base, base + i - 1, base + i);
            let face = if self.reverse_winding {
                Face::triangle(a, c, b, cluster)
            } else {
                Face::triangle(a, b, c, cluster)
            };
            self.mesh.faces.push(face);
        }
    }
}

/// Clamp a float color to RGBA8.
fn rgba8(color: Vec4) -> [u8; 4] {
    (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0)
        .round()
        .to_array()
        .map(|c| c as u8)
}

impl XsiLoader<'_> {
    /// `XSI_Mesh name { XSI_Shape, XSI_VertexList, (XSI_PolygonList | XSI_TriangleList)* }`
    ///
    /// Returns the mesh and the source position index of every vertex.
    /// Missing normals and tangents are generated.
    pub(super) fn parse_mesh(
        &mut self,
        model: &str,
        animated: bool,
        visible: bool,
    ) -> ParseResult<(Mesh, Vec<u32>)> {
        let name = self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;

        let table = self.parse_shape()?;
        let (position, vertex_list) = self.parse_vertex_list(&table)?;

        let mut build = MeshBuild {
            model,
            animated,
            visible,
            table: &table,
            position,
            vertex_list: &vertex_list,
            handedness: self.mirror.sign(),
            reverse_winding: self.mirror.reverses_winding(),
            mesh: Mesh::new(name),
            position_map: Vec::new(),
        };

        loop {
            let triangles = if self.scan.if_name("XSI_PolygonList")? {
                false
            } else if self.scan.if_name("XSI_TriangleList")? {
                true
            } else {
                break;
            };
            self.parse_polygon_list(&mut build, triangles)?;
        }
        self.scan.expect_punct('}')?;

        let MeshBuild {
            mut mesh,
            position_map,
            ..
        } = build;
        mesh.fill_missing_normals();
        mesh.fill_missing_tangents();

        log::debug!(
            "Mesh {}: {} clusters, {} vertices, {} faces",
            mesh.name,
            mesh.clusters.len(),
            mesh.vertices.len(),
            mesh.faces.len()
        );
        Ok((mesh, position_map))
    }

    /// `name { elements, attribute names…, material, [vertexmax], count, polygons, [XSI_IndexList] }`
    ///
    /// Every corner row holds one vertex-list index followed by one index per
    /// named attribute. Triangle lists omit the per-polygon corner count.
    fn parse_polygon_list(&mut self, build: &mut MeshBuild, triangles: bool) -> ParseResult<()> {
        let table = build.table;
        self.scan.scan_xsi_name()?;
        self.scan.expect_punct('{')?;

        let elements = self.scan.scan_count()?;
        let mut channels = Channels::default();
        let mut limits = vec![build.vertex_list.len()];
        for column in 1..=elements {
            let name = self.scan.scan_string()?;
            let Some(attribute) = table.find(&name) else {
                return Err(self.scan.error(format!("unknown attribute {name}")));
            };
            limits.push(table.get(attribute).data.len());

            let entry = (column, attribute);
            match table.get(attribute).kind {
                AttributeKind::UserNormal => {}
                AttributeKind::Normal => {
                    if channels.normal.replace(entry).is_some() {
                        return Err(self.scan.error("too many normals"));
                    }
                }
                AttributeKind::Tangent => {
                    if channels.tangent.replace(entry).is_some() {
                        return Err(self.scan.error("too many tangents"));
                    }
                }
                AttributeKind::Color => {
                    if channels.colors.len() == MAX_COLORS {
                        return Err(self.scan.error("too many colors"));
                    }
                    channels.colors.push(entry);
                }
                AttributeKind::TexCoord => {
                    if channels.uvs.iter().any(|&(_, a)| a == attribute) {
                        return Err(self.scan.error(format!("duplicate uv channel {name}")));
                    }
                    if channels.uvs.len() == MAX_UVS {
                        return Err(self.scan.error("too many uv channels"));
                    }
                    channels.uvs.push(entry);
                }
                AttributeKind::Position | AttributeKind::WeightMap => {
                    return Err(self.scan.error(format!("unexpected attribute {name}")));
                }
            }
        }
        if channels.normal.is_none() {
            self.warn(format!("mesh {}: no normals found", build.mesh.name));
        }

        let material_name = self.scan.scan_string()?;
        let (declared, material) = self.cluster_material(&material_name, build.animated)?;

        let uv_names: Vec<&str> = channels
            .uvs
            .iter()
            .map(|&(_, a)| table.get(a).name.as_str())
            .collect();
        let selection = select_texture_spaces(
            declared.map(|i| &self.materials[i]),
            build.model,
            &uv_names,
        )
        .map_err(|message| self.scan.error(message))?;
        if build.visible {
            for warning in selection.warnings {
                self.warn(warning);
            }
        }
        let uvs: Vec<(usize, usize)> = selection.channels.iter().map(|&c| channels.uvs[c]).collect();
        let spaces = selection
            .channels
            .iter()
            .map(|&c| uv_names[c].to_string())
            .collect();

        if !triangles {
            self.scan.scan_int()?;
        }
        let polygons = self.scan.scan_count()?;

        let cluster = build.mesh.clusters.len();
        let first_face = build.mesh.faces.len();
        build.mesh.clusters.push(Cluster::new(material, spaces));

        let mut row = vec![0usize; limits.len()];
        for _ in 0..polygons {
            let line = self.scan.line();
            let corners = if triangles { 3 } else { self.scan.scan_count()? };
            let base = build.mesh.vertices.len();

            for _ in 0..corners {
                for (column, slot) in row.iter_mut().enumerate() {
                    let line = self.scan.line();
                    let index = self.scan.scan_int()?;
                    *slot = match usize::try_from(index) {
                        Ok(i) if i < limits[column] => i,
                        _ => {
                            return Err(ParseError::Syntax {
                                line,
                                message: format!(
                                    "index {index} out of range ({}) in column {column}",
                                    limits[column]
                                ),
                            })
                        }
                    };
                }
                build.push_corner(&row, &channels, &uvs);
            }

            if corners < 3 {
                build.mesh.vertices.truncate(base);
                build.position_map.truncate(base);
                self.warn_at(line, format!("degenerate polygon with {corners} corners skipped"));
                continue;
            }
            build.push_faces(base as u32, corners as u32, cluster);
        }

        if self.scan.if_name("XSI_IndexList")? {
            self.scan.expect_punct('{')?;
            let count = self.scan.scan_count()?;
            self.scan.skip_ints(count)?;
            self.scan.expect_punct('}')?;
        }
        self.scan.expect_punct('}')?;

        build.mesh.clusters[cluster].face_range = first_face..build.mesh.faces.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_clamps() {
        assert_eq!(rgba8(Vec4::new(1.0, 0.5, -1.0, 2.0)), [255, 128, 0, 255]);
    }

    #[test]
    fn test_fan_and_quad_winding() {
        let table = AttributeTable::default();
        let mut build = MeshBuild {
            model: "MDL-Test",
            animated: false,
            visible: true,
            table: &table,
            position: 0,
            vertex_list: &[],
            handedness: 1.0,
            reverse_winding: false,
            mesh: Mesh::new("test"),
            position_map: Vec::new(),
        };
        build.push_faces(0, 5, 0);
        let fan: Vec<_> = build.mesh.faces.iter().map(|f| f.corners().to_vec()).collect();
        assert_eq!(fan, vec![vec![0, 1, 2], vec![0, 2, 3], vec![0, 3, 4]]);

        build.mesh.faces.clear();
        build.reverse_winding = true;
        build.push_faces(0, 4, 0);
        build.push_faces(4, 5, 0);
        let mirrored: Vec<_> = build.mesh.faces.iter().map(|f| f.corners().to_vec()).collect();
        assert_eq!(
            mirrored,
            vec![vec![3, 2, 1, 0], vec![4, 6, 5], vec![4, 7, 6], vec![4, 8, 7]]
        );
    }
}
