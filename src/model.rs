// Model geometry: the vertex format and a Wavefront OBJ reader
//
// Only positions (with the optional "v x y z r g b" color extension) and
// faces are read. Faces with more than three corners are fanned into
// triangles. Texture coordinates, normals, groups and materials are ignored.

use std::io::BufRead;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Interleaved vertex: position + RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("model has no faces")]
    Empty,
}

/// Flat vertex and index arrays ready for upload
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Model {
    pub fn load<P: AsRef<Path>>(path: P, default_color: [f32; 4]) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path.as_ref())?;
        let model = Self::parse(std::io::BufReader::new(file), default_color)?;

        log::info!(
            "Loaded {:?}: {} vertices, {} triangles",
            path.as_ref(),
            model.vertices.len(),
            model.indices.len() / 3
        );
        Ok(model)
    }

    pub fn parse<R: BufRead>(reader: R, default_color: [f32; 4]) -> Result<Self, ModelError> {
        let mut model = Model::default();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let number = number + 1;
            let mut tokens = line.split_whitespace();

            match tokens.next() {
                Some("v") => {
                    let values = tokens
                        .map(|t| parse_float(t, number))
                        .collect::<Result<Vec<_>, _>>()?;
                    model.vertices.push(vertex_from(&values, default_color, number)?);
                }
                Some("f") => {
                    let corners = tokens
                        .map(|t| resolve_index(t, model.vertices.len(), number))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(parse_error(number, "face needs at least three corners"));
                    }
                    for i in 1..corners.len() - 1 {
                        model.indices.extend([corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if model.indices.is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(model)
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> ModelError {
    ModelError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_float(token: &str, line: usize) -> Result<f32, ModelError> {
    token
        .parse()
        .map_err(|_| parse_error(line, format!("invalid number '{}'", token)))
}

fn vertex_from(values: &[f32], default_color: [f32; 4], line: usize) -> Result<Vertex, ModelError> {
    match *values {
        // "v x y z" or "v x y z w"
        [x, y, z] | [x, y, z, _] => Ok(Vertex {
            position: [x, y, z],
            color: default_color,
        }),
        // "v x y z r g b"
        [x, y, z, r, g, b] => Ok(Vertex {
            position: [x, y, z],
            color: [r, g, b, 1.0],
        }),
        _ => Err(parse_error(line, format!("vertex has {} components", values.len()))),
    }
}

/// Turn "7", "7/1", "7//3", "7/1/3" or a negative reference into a
/// zero-based index
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<u32, ModelError> {
    let position = token.split('/').next().unwrap_or_default();
    let reference: i64 = position
        .parse()
        .map_err(|_| parse_error(line, format!("invalid face corner '{}'", token)))?;

    let count = vertex_count as i64;
    let index = match reference {
        r if r > 0 => r - 1,
        r if r < 0 => count + r,
        _ => return Err(parse_error(line, "vertex indices start at 1")),
    };

    if index < 0 || index >= count {
        return Err(parse_error(
            line,
            format!("vertex {} out of range ({} defined)", reference, count),
        ));
    }
    u32::try_from(index).map_err(|_| parse_error(line, "vertex index does not fit in 32 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

    fn parse(src: &str) -> Result<Model, ModelError> {
        Model::parse(src.as_bytes(), BLACK)
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
    }

    #[test]
    fn single_triangle() {
        let model = parse(
            "# comment\n\
             o tri\n\
             v 0 0 0\n\
             v 1 0 0\n\
             v 0 1 0\n\
             f 1 2 3\n",
        )
        .unwrap();

        assert_eq!(model.vertices.len(), 3);
        assert_eq!(model.indices, vec![0, 1, 2]);
        assert_eq!(model.vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(model.vertices[1].color, BLACK);
    }

    #[test]
    fn quads_are_fanned() {
        let model = parse(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 2 0\n\
             f 1 2 3 4\n\
             f 1 3 4 5 2\n",
        )
        .unwrap();

        assert_eq!(model.indices, vec![0, 1, 2, 0, 2, 3, 0, 2, 3, 0, 3, 4, 0, 4, 1]);
    }

    #[test]
    fn texture_and_normal_references_are_skipped() {
        let model = parse(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n\
             vt 0 0\nvn 0 0 1\n\
             f 1/1/1 2//1 3/1\n",
        )
        .unwrap();
        assert_eq!(model.indices, vec![0, 1, 2]);
    }

    #[test]
    fn negative_indices_count_back_from_the_last_vertex() {
        let model = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(model.indices, vec![0, 1, 2]);
    }

    #[test]
    fn vertex_colors_override_the_default() {
        let model = parse("v 0 0 0 1 0 0\nv 1 0 0\nv 0 1 0 0 0.5 1\nf 1 2 3\n").unwrap();
        assert_eq!(model.vertices[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.vertices[1].color, BLACK);
        assert_eq!(model.vertices[2].color, [0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn out_of_range_face_is_rejected() {
        match parse("v 0 0 0\nv 1 0 0\nf 1 2 3\n") {
            Err(ModelError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_index_is_rejected() {
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n"),
            Err(ModelError::Parse { line: 4, .. })
        ));
    }

    #[test]
    fn degenerate_face_is_rejected() {
        assert!(matches!(
            parse("v 0 0 0\nv 1 0 0\nf 1 2\n"),
            Err(ModelError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn bad_number_is_rejected() {
        assert!(matches!(
            parse("v 0 zero 0\n"),
            Err(ModelError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn model_without_faces_is_empty() {
        assert!(matches!(parse("v 0 0 0\nv 1 0 0\n"), Err(ModelError::Empty)));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Model::load("does/not/exist.obj", BLACK),
            Err(ModelError::Io(_))
        ));
    }
}
