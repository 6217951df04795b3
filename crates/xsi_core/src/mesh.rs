//! Renderer-facing mesh container.
//!
//! A [`Mesh`] owns flat vertex records, polygon faces (triangles or quads),
//! material clusters, the materials and textures those clusters reference and
//! an optional skeleton. Loaders populate it and then run the merge passes
//! below before handing it to a renderer.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use xsi_math::{Affine3A, AffineExt, Vec2, Vec3};

use crate::material::Material;
use crate::skeleton::Skeleton;
use crate::texture::Texture;

/// Maximum joint influences per vertex.
pub const MAX_WEIGHTS: usize = 4;

/// A skinnable vertex, laid out for direct GPU upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    /// Handedness of the bitangent (1 or -1)
    pub bitangent_sign: f32,
    pub color0: [u8; 4],
    pub color1: [u8; 4],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    /// Joint indices, -1 marks an unused slot
    pub joints: [i32; MAX_WEIGHTS],
    pub weights: [f32; MAX_WEIGHTS],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            tangent: [0.0; 3],
            bitangent_sign: 1.0,
            color0: [255; 4],
            color1: [255; 4],
            uv0: [0.0; 2],
            uv1: [0.0; 2],
            joints: [-1; MAX_WEIGHTS],
            weights: [0.0; MAX_WEIGHTS],
        }
    }
}

impl Vertex {
    /// Create a vertex at a position with default attributes.
    pub fn at(position: Vec3) -> Self {
        Self {
            position: position.to_array(),
            ..Default::default()
        }
    }

    pub fn pos(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Accumulate a joint influence.
    ///
    /// A repeated joint adds to its existing weight. When all slots are taken
    /// the lightest influence is replaced if the new one is heavier.
    pub fn add_weight(&mut self, joint: usize, weight: f32) {
        let joint = joint as i32;
        if let Some(slot) = self.joints.iter().position(|&j| j == joint) {
            self.weights[slot] += weight;
            return;
        }
        if let Some(slot) = self.joints.iter().position(|&j| j < 0) {
            self.joints[slot] = joint;
            self.weights[slot] = weight;
            return;
        }

        let (slot, lightest) = self
            .weights
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::INFINITY), |best, (i, w)| if w < best.1 { (i, w) } else { best });
        if weight > lightest {
            self.joints[slot] = joint;
            self.weights[slot] = weight;
        }
    }

    /// Rescale influences so they sum to 1. Vertices without influences are untouched.
    pub fn normalize_weights(&mut self) {
        let total: f32 = self.influences().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return;
        }
        for (joint, weight) in self.joints.iter().zip(self.weights.iter_mut()) {
            if *joint >= 0 {
                *weight /= total;
            } else {
                *weight = 0.0;
            }
        }
    }

    /// Whether any joint influences this vertex.
    pub fn has_influence(&self) -> bool {
        self.joints.iter().any(|&j| j >= 0)
    }

    /// Bind rigidly to a single joint.
    pub fn set_rigid(&mut self, joint: usize) {
        self.joints = [joint as i32, -1, -1, -1];
        self.weights = [1.0, 0.0, 0.0, 0.0];
    }

    /// Iterate over used (joint, weight) slots.
    pub fn influences(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.joints
            .iter()
            .zip(self.weights.iter())
            .filter(|(j, _)| **j >= 0)
            .map(|(j, w)| (*j as usize, *w))
    }

    fn offset_joints(&mut self, base: usize) {
        for joint in self.joints.iter_mut().filter(|j| **j >= 0) {
            *joint += base as i32;
        }
    }

    fn bit_key(&self) -> [u32; 24] {
        bytemuck::cast(*self)
    }
}

/// A triangle or quad referencing vertices of its mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Face {
    pub vertices: [u32; 4],
    /// Number of used corners (3 or 4)
    pub count: u8,
    /// Index of the owning cluster
    pub cluster: usize,
}

impl Face {
    pub fn triangle(a: u32, b: u32, c: u32, cluster: usize) -> Self {
        Self {
            vertices: [a, b, c, 0],
            count: 3,
            cluster,
        }
    }

    pub fn quad(a: u32, b: u32, c: u32, d: u32, cluster: usize) -> Self {
        Self {
            vertices: [a, b, c, d],
            count: 4,
            cluster,
        }
    }

    pub fn corners(&self) -> &[u32] {
        &self.vertices[..self.count as usize]
    }

    /// Split into triangles; a quad (a, b, c, d) becomes (a, b, c) and (a, c, d).
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        let v = self.vertices;
        let second = (self.count == 4).then_some([v[0], v[2], v[3]]);
        std::iter::once([v[0], v[1], v[2]]).chain(second)
    }
}

/// A run of faces sharing one material and one UV channel selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cluster {
    /// Index into [`Mesh::materials`]
    pub material: usize,

    /// Names of the UV channels feeding `uv0` / `uv1` (at most two)
    pub texture_spaces: Vec<String>,

    /// Faces of this cluster after [`Mesh::sort_faces_by_cluster`]
    pub face_range: Range<usize>,

    /// Joints referenced by this cluster's vertices (set by skinning split)
    pub bones: Vec<usize>,
}

impl Cluster {
    pub fn new(material: usize, texture_spaces: Vec<String>) -> Self {
        Self {
            material,
            texture_spaces,
            ..Default::default()
        }
    }
}

/// The master mesh container.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    pub clusters: Vec<Cluster>,
    pub materials: Vec<Material>,
    pub textures: Vec<Arc<Texture>>,
    pub skeleton: Option<Skeleton>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Number of triangles after splitting quads.
    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.count as usize - 2).sum()
    }

    /// Axis-aligned bounds as (min, max), or None for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(Vertex::pos);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Append another mesh, offsetting every index it carries.
    ///
    /// Vertex, cluster, material, texture and joint indices of `other` are
    /// shifted past the current contents. Skeletons are concatenated.
    pub fn append(&mut self, other: Mesh) {
        let material_base = self.materials.len();
        let texture_base = self.textures.len();
        let joint_base = self.skeleton.as_ref().map_or(0, |s| s.joints.len());

        let Mesh {
            vertices,
            faces,
            clusters,
            materials,
            textures,
            skeleton,
            ..
        } = other;

        let first_cluster = self.clusters.len();
        self.append_geometry(vertices, faces, clusters, joint_base);
        for cluster in &mut self.clusters[first_cluster..] {
            cluster.material += material_base;
        }

        self.materials.extend(materials.into_iter().map(|mut m| {
            m.diffuse_texture = m.diffuse_texture.map(|t| t + texture_base);
            m.reflection_texture = m.reflection_texture.map(|t| t + texture_base);
            m
        }));
        self.textures.extend(textures);

        if let Some(theirs) = skeleton {
            match self.skeleton.as_mut() {
                Some(mine) => mine.append(theirs),
                None => self.skeleton = Some(theirs),
            }
        }
    }

    /// Append geometry whose material and joint indices already refer to this mesh.
    pub fn append_shared(&mut self, other: Mesh) {
        self.append_geometry(other.vertices, other.faces, other.clusters, 0);
    }

    fn append_geometry(
        &mut self,
        vertices: Vec<Vertex>,
        faces: Vec<Face>,
        clusters: Vec<Cluster>,
        joint_base: usize,
    ) {
        let vertex_base = self.vertices.len() as u32;
        let cluster_base = self.clusters.len();
        let face_base = self.faces.len();

        self.vertices.extend(vertices.into_iter().map(|mut v| {
            v.offset_joints(joint_base);
            v
        }));
        self.faces.extend(faces.into_iter().map(|mut f| {
            for corner in &mut f.vertices[..f.count as usize] {
                *corner += vertex_base;
            }
            f.cluster += cluster_base;
            f
        }));
        self.clusters.extend(clusters.into_iter().map(|mut c| {
            c.face_range = c.face_range.start + face_base..c.face_range.end + face_base;
            for bone in &mut c.bones {
                *bone += joint_base;
            }
            c
        }));
    }

    /// Transform positions, normals and tangents of every vertex.
    pub fn transform(&mut self, matrix: &Affine3A) {
        for v in &mut self.vertices {
            v.position = matrix.transform_point3(v.pos()).to_array();
            v.normal = matrix
                .transform_normal(Vec3::from_array(v.normal))
                .to_array();
            v.tangent = matrix
                .transform_vector3(Vec3::from_array(v.tangent))
                .normalize_or_zero()
                .to_array();
        }
    }

    /// Merge clusters with the same material and texture spaces.
    pub fn merge_clusters(&mut self) {
        let mut merged: Vec<Cluster> = Vec::new();
        let mut lookup: HashMap<(usize, Vec<String>), usize> = HashMap::new();
        let mut remap = Vec::with_capacity(self.clusters.len());

        for cluster in self.clusters.drain(..) {
            let key = (cluster.material, cluster.texture_spaces.clone());
            let id = *lookup.entry(key).or_insert_with(|| {
                merged.push(Cluster::new(cluster.material, cluster.texture_spaces));
                merged.len() - 1
            });
            remap.push(id);
        }

        for face in &mut self.faces {
            face.cluster = remap[face.cluster];
        }
        self.clusters = merged;
        self.sort_faces_by_cluster();
    }

    /// Collapse bit-identical vertices.
    pub fn merge_vertices(&mut self) {
        let mut unique: Vec<Vertex> = Vec::with_capacity(self.vertices.len());
        let mut lookup: HashMap<[u32; 24], u32> = HashMap::new();
        let mut remap = Vec::with_capacity(self.vertices.len());

        for v in &self.vertices {
            let id = *lookup.entry(v.bit_key()).or_insert_with(|| {
                unique.push(*v);
                unique.len() as u32 - 1
            });
            remap.push(id);
        }

        for face in &mut self.faces {
            for corner in &mut face.vertices[..face.count as usize] {
                *corner = remap[*corner as usize];
            }
        }

        log::debug!(
            "Merged vertices: {} -> {}",
            self.vertices.len(),
            unique.len()
        );
        self.vertices = unique;
    }

    /// Sort faces so each cluster owns one contiguous `face_range`.
    pub fn sort_faces_by_cluster(&mut self) {
        self.faces.sort_by_key(|f| f.cluster);
        for cluster in &mut self.clusters {
            cluster.face_range = 0..0;
        }
        let mut start = 0;
        while start < self.faces.len() {
            let id = self.faces[start].cluster;
            let end = start
                + self.faces[start..]
                    .iter()
                    .take_while(|f| f.cluster == id)
                    .count();
            if let Some(cluster) = self.clusters.get_mut(id) {
                cluster.face_range = start..end;
            }
            start = end;
        }
    }

    /// Split clusters whose faces reference more than `max_bones` joints.
    ///
    /// Faces are assigned greedily in order; a face that would overflow the
    /// current palette starts a new cluster with the same material. Each
    /// resulting cluster records its palette in `bones`.
    pub fn split_clusters_for_skinning(&mut self, max_bones: usize) {
        self.sort_faces_by_cluster();
        let original = self.clusters.len();

        for id in 0..original {
            let range = self.clusters[id].face_range.clone();
            let mut current = id;
            let mut palette: Vec<usize> = Vec::new();

            for face_index in range {
                let mut needed: Vec<usize> = Vec::new();
                for &corner in self.faces[face_index].corners() {
                    for (joint, _) in self.vertices[corner as usize].influences() {
                        if !palette.contains(&joint) && !needed.contains(&joint) {
                            needed.push(joint);
                        }
                    }
                }

                if !palette.is_empty() && palette.len() + needed.len() > max_bones {
                    self.clusters[current].bones = std::mem::take(&mut palette);
                    let template = &self.clusters[id];
                    let split = Cluster::new(template.material, template.texture_spaces.clone());
                    self.clusters.push(split);
                    current = self.clusters.len() - 1;
                }

                palette.extend(needed);
                self.faces[face_index].cluster = current;
            }
            self.clusters[current].bones = palette;
        }

        if self.clusters.len() > original {
            log::debug!(
                "Split {} clusters into {} for a {}-bone limit",
                original,
                self.clusters.len(),
                max_bones
            );
        }
        self.sort_faces_by_cluster();
    }

    /// Drop materials no cluster uses and textures no material uses.
    pub fn prune_materials(&mut self) {
        let used: HashSet<usize> = self.clusters.iter().map(|c| c.material).collect();
        let mut material_remap = vec![usize::MAX; self.materials.len()];
        let mut kept = Vec::new();
        for (i, material) in self.materials.drain(..).enumerate() {
            if used.contains(&i) {
                material_remap[i] = kept.len();
                kept.push(material);
            }
        }
        for cluster in &mut self.clusters {
            cluster.material = material_remap[cluster.material];
        }

        let mut texture_remap = vec![usize::MAX; self.textures.len()];
        let mut textures = Vec::new();
        for material in &mut kept {
            for slot in [&mut material.diffuse_texture, &mut material.reflection_texture] {
                if let Some(id) = slot {
                    if texture_remap[*id] == usize::MAX {
                        texture_remap[*id] = textures.len();
                        textures.push(Arc::clone(&self.textures[*id]));
                    }
                    *id = texture_remap[*id];
                }
            }
        }

        self.materials = kept;
        self.textures = textures;
    }

    /// Compute smooth, area-weighted normals for every vertex.
    ///
    /// Vertices sharing a position share a normal even when other attributes
    /// split them.
    pub fn compute_normals(&mut self) {
        let normals = self.smooth_normals();
        for (v, n) in self.vertices.iter_mut().zip(normals) {
            v.normal = n.to_array();
        }
    }

    /// Compute normals only for vertices whose normal is zero.
    pub fn fill_missing_normals(&mut self) {
        if self.vertices.iter().all(|v| v.normal != [0.0; 3]) {
            return;
        }
        let normals = self.smooth_normals();
        for (v, n) in self.vertices.iter_mut().zip(normals) {
            if v.normal == [0.0; 3] {
                v.normal = n.to_array();
            }
        }
    }

    fn smooth_normals(&self) -> Vec<Vec3> {
        let mut sums: HashMap<[u32; 3], Vec3> = HashMap::new();
        let key = |p: [f32; 3]| [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()];

        for face in &self.faces {
            for [a, b, c] in face.triangles() {
                let pa = self.vertices[a as usize].pos();
                let pb = self.vertices[b as usize].pos();
                let pc = self.vertices[c as usize].pos();
                let n = (pb - pa).cross(pc - pa);
                for i in [a, b, c] {
                    *sums.entry(key(self.vertices[i as usize].position)).or_insert(Vec3::ZERO) += n;
                }
            }
        }

        self.vertices
            .iter()
            .map(|v| {
                sums.get(&key(v.position))
                    .copied()
                    .unwrap_or(Vec3::ZERO)
                    .normalize_or_zero()
            })
            .collect()
    }

    /// Compute tangents from the first UV channel for every vertex.
    pub fn compute_tangents(&mut self) {
        let frames = self.uv_tangents();
        for (v, (t, sign)) in self.vertices.iter_mut().zip(frames) {
            v.tangent = t.to_array();
            v.bitangent_sign = sign;
        }
    }

    /// Compute tangents only for vertices whose tangent is zero.
    pub fn fill_missing_tangents(&mut self) {
        if self.vertices.iter().all(|v| v.tangent != [0.0; 3]) {
            return;
        }
        let frames = self.uv_tangents();
        for (v, (t, sign)) in self.vertices.iter_mut().zip(frames) {
            if v.tangent == [0.0; 3] {
                v.tangent = t.to_array();
                v.bitangent_sign = sign;
            }
        }
    }

    /// Orthonormal tangent and bitangent sign per vertex.
    fn uv_tangents(&self) -> Vec<(Vec3, f32)> {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for face in &self.faces {
            for [a, b, c] in face.triangles() {
                let (va, vb, vc) = (
                    &self.vertices[a as usize],
                    &self.vertices[b as usize],
                    &self.vertices[c as usize],
                );
                let e1 = vb.pos() - va.pos();
                let e2 = vc.pos() - va.pos();
                let d1 = Vec2::from_array(vb.uv0) - Vec2::from_array(va.uv0);
                let d2 = Vec2::from_array(vc.uv0) - Vec2::from_array(va.uv0);
                let det = d1.x * d2.y - d2.x * d1.y;
                if det.abs() < 1e-12 {
                    continue;
                }
                let r = 1.0 / det;
                let tangent = (e1 * d2.y - e2 * d1.y) * r;
                let bitangent = (e2 * d1.x - e1 * d2.x) * r;
                for i in [a, b, c] {
                    tangents[i as usize] += tangent;
                    bitangents[i as usize] += bitangent;
                }
            }
        }

        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let n = Vec3::from_array(v.normal);
                let t = tangents[i] - n * n.dot(tangents[i]);
                let t = if t.length_squared() > 1e-12 {
                    t.normalize()
                } else {
                    n.any_orthonormal_vector()
                };
                let sign = if n.cross(t).dot(bitangents[i]) < 0.0 { -1.0 } else { 1.0 };
                (t, sign)
            })
            .collect()
    }

    /// Triangle list over all faces.
    pub fn triangle_indices(&self) -> Vec<u32> {
        self.faces.iter().flat_map(|f| f.triangles()).flatten().collect()
    }

    /// Triangle list for one cluster.
    pub fn cluster_triangle_indices(&self, cluster: usize) -> Vec<u32> {
        self.faces
            .iter()
            .filter(|f| f.cluster == cluster)
            .flat_map(|f| f.triangles())
            .flatten()
            .collect()
    }

    /// Vertex buffer as raw bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> Mesh {
        let mut mesh = Mesh::new("quad");
        for p in [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y] {
            mesh.vertices.push(Vertex::at(p));
        }
        mesh.clusters.push(Cluster::new(0, vec![]));
        mesh.faces.push(Face::quad(0, 1, 2, 3, 0));
        mesh.materials.push(Material::new("m"));
        mesh.sort_faces_by_cluster();
        mesh
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 96);
        let mesh = quad_mesh();
        assert_eq!(mesh.vertex_bytes().len(), 4 * 96);
    }

    #[test]
    fn test_quad_triangulation() {
        let mesh = quad_mesh();
        assert_eq!(mesh.triangle_indices(), vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.cluster_triangle_indices(0).len(), 6);
    }

    #[test]
    fn test_add_weight_accumulates_and_replaces() {
        let mut v = Vertex::default();
        v.add_weight(3, 0.2);
        v.add_weight(3, 0.3);
        assert_eq!(v.influences().collect::<Vec<_>>(), vec![(3, 0.5)]);

        for (j, w) in [(1, 0.1), (2, 0.4), (4, 0.6)] {
            v.add_weight(j, w);
        }
        // All slots full; 0.05 is lighter than every slot and is dropped
        v.add_weight(7, 0.05);
        assert!(!v.joints.contains(&7));
        // 0.3 beats the 0.1 slot
        v.add_weight(8, 0.3);
        assert!(v.joints.contains(&8));
        assert!(!v.joints.contains(&1));
    }

    #[test]
    fn test_normalize_weights() {
        let mut v = Vertex::default();
        v.add_weight(0, 1.4);
        v.add_weight(1, 0.6);
        v.normalize_weights();
        let sum: f32 = v.influences().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!((v.weights[0] - 0.7).abs() < 1e-6);

        let mut empty = Vertex::default();
        empty.normalize_weights();
        assert!(!empty.has_influence());
    }

    #[test]
    fn test_compute_normals_ccw() {
        let mut mesh = quad_mesh();
        mesh.compute_normals();
        for v in &mesh.vertices {
            assert!((Vec3::from_array(v.normal) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_compute_tangents_follow_u() {
        let mut mesh = quad_mesh();
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for (v, uv) in mesh.vertices.iter_mut().zip(uvs) {
            v.uv0 = uv;
        }
        mesh.compute_normals();
        mesh.compute_tangents();
        for v in &mesh.vertices {
            assert!((Vec3::from_array(v.tangent) - Vec3::X).length() < 1e-5);
            assert_eq!(v.bitangent_sign, 1.0);
        }
    }

    #[test]
    fn test_fill_missing_keeps_authored_normals() {
        let mut mesh = quad_mesh();
        mesh.vertices[0].normal = [1.0, 0.0, 0.0];
        mesh.fill_missing_normals();
        assert_eq!(mesh.vertices[0].normal, [1.0, 0.0, 0.0]);
        assert!((Vec3::from_array(mesh.vertices[1].normal) - Vec3::Z).length() < 1e-5);

        mesh.vertices[2].tangent = [0.0, 1.0, 0.0];
        mesh.fill_missing_tangents();
        assert_eq!(mesh.vertices[2].tangent, [0.0, 1.0, 0.0]);
        assert_ne!(mesh.vertices[3].tangent, [0.0; 3]);
    }

    #[test]
    fn test_merge_vertices() {
        let mut mesh = Mesh::new("dup");
        for p in [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ZERO, Vec3::Y, Vec3::Z] {
            mesh.vertices.push(Vertex::at(p));
        }
        mesh.clusters.push(Cluster::new(0, vec![]));
        mesh.faces.push(Face::triangle(0, 1, 2, 0));
        mesh.faces.push(Face::triangle(3, 4, 5, 0));
        mesh.merge_vertices();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.faces[1].corners(), &[0, 2, 3]);
    }

    #[test]
    fn test_merge_clusters() {
        let mut mesh = quad_mesh();
        mesh.clusters.push(Cluster::new(0, vec![]));
        mesh.clusters.push(Cluster::new(0, vec!["uv".into()]));
        mesh.faces.push(Face::triangle(0, 1, 2, 1));
        mesh.faces.push(Face::triangle(0, 2, 3, 2));
        mesh.merge_clusters();
        assert_eq!(mesh.clusters.len(), 2);
        assert_eq!(mesh.clusters[0].face_range, 0..2);
        assert_eq!(mesh.clusters[1].face_range, 2..3);
    }

    #[test]
    fn test_split_clusters_for_skinning() {
        let mut mesh = Mesh::new("skin");
        for j in 0..6 {
            let mut v = Vertex::at(Vec3::splat(j as f32));
            v.set_rigid(j);
            mesh.vertices.push(v);
        }
        mesh.clusters.push(Cluster::new(0, vec![]));
        mesh.faces.push(Face::triangle(0, 1, 2, 0));
        mesh.faces.push(Face::triangle(3, 4, 5, 0));
        mesh.faces.push(Face::triangle(0, 1, 2, 0));
        mesh.split_clusters_for_skinning(4);

        assert_eq!(mesh.clusters.len(), 3);
        assert_eq!(mesh.clusters[0].bones, vec![0, 1, 2]);
        assert_eq!(mesh.clusters[1].bones, vec![3, 4, 5]);
        assert_eq!(mesh.clusters[2].bones, vec![0, 1, 2]);
        for c in &mesh.clusters {
            assert!(c.bones.len() <= 4);
        }
    }

    #[test]
    fn test_prune_materials() {
        let mut mesh = quad_mesh();
        let tex = Arc::new(Texture::solid_color([1.0; 4]));
        mesh.textures = vec![Arc::clone(&tex), tex];
        mesh.materials = vec![Material::new("unused"), Material::new("used")];
        mesh.materials[0].diffuse_texture = Some(0);
        mesh.materials[1].diffuse_texture = Some(1);
        mesh.clusters[0].material = 1;
        mesh.prune_materials();
        assert_eq!(mesh.materials.len(), 1);
        assert_eq!(mesh.materials[0].name, "used");
        assert_eq!(mesh.materials[0].diffuse_texture, Some(0));
        assert_eq!(mesh.textures.len(), 1);
        assert_eq!(mesh.clusters[0].material, 0);
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut master = quad_mesh();
        master.skeleton = Some(Skeleton::default());
        if let Some(s) = master.skeleton.as_mut() {
            s.add_joint("root", None);
        }

        let mut other = quad_mesh();
        let mut skeleton = Skeleton::default();
        let joint = skeleton.add_joint("other", None);
        other.skeleton = Some(skeleton);
        other.vertices[0].set_rigid(joint);

        master.append(other);
        assert_eq!(master.vertices.len(), 8);
        assert_eq!(master.faces[1].corners(), &[4, 5, 6, 7]);
        assert_eq!(master.faces[1].cluster, 1);
        assert_eq!(master.clusters[1].material, 1);
        assert_eq!(master.clusters[1].face_range, 1..2);
        assert_eq!(master.vertices[4].joints[0], 1);
        assert_eq!(master.skeleton.as_ref().map(|s| s.joints.len()), Some(2));
    }
}
