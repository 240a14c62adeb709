//! glTF mesh loading.

use std::path::Path;

use gltf::mesh::Mode;

use super::geometry::{NormalVertex, StaticGeometry};
use crate::{RenderError, Result};

/// Loads the first mesh of a glTF file as a flat, non-indexed triangle list.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<StaticGeometry> {
    let path = path.as_ref();
    let (document, buffers, _images) =
        gltf::import(path).map_err(|e| RenderError::Mesh(format!("{}: {e}", path.display())))?;

    let mesh = document
        .meshes()
        .next()
        .ok_or_else(|| RenderError::Mesh(format!("{} contains no meshes", path.display())))?;

    let mut vertices = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            log::warn!("Skipping {:?} primitive in {}", primitive.mode(), path.display());
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| RenderError::Mesh("Primitive has no positions".into()))?
            .collect();
        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .ok_or_else(|| RenderError::Mesh("Primitive has no normals".into()))?
            .collect();
        let indices: Option<Vec<u32>> = reader.read_indices().map(|indices| indices.into_u32().collect());

        vertices.extend(expand(&positions, &normals, indices.as_deref())?);
    }

    if vertices.is_empty() {
        return Err(RenderError::Mesh(format!("{} has no triangles", path.display())));
    }

    log::info!(
        "Loaded mesh '{}' ({} vertices) from {}",
        mesh.name().unwrap_or("unnamed"),
        vertices.len(),
        path.display()
    );
    Ok(StaticGeometry::mesh(&vertices))
}

/// Resolves optional indices into one vertex per corner.
pub fn expand(positions: &[[f32; 3]], normals: &[[f32; 3]], indices: Option<&[u32]>) -> Result<Vec<NormalVertex>> {
    if positions.len() != normals.len() {
        return Err(RenderError::Mesh(format!(
            "{} positions but {} normals",
            positions.len(),
            normals.len()
        )));
    }

    let vertex = |index: usize| {
        positions
            .get(index)
            .zip(normals.get(index))
            .map(|(&position, &normal)| NormalVertex { position, normal })
            .ok_or_else(|| RenderError::Mesh(format!("Index {index} out of range")))
    };

    match indices {
        Some(indices) => indices.iter().map(|&index| vertex(index as usize)).collect(),
        None => (0..positions.len()).map(vertex).collect(),
    }
}
