/// GFA 1.0 reader/writer, covering the record types the layout engine
/// needs: S (segments), L (links), P (paths). Segment names are mapped to
/// compact 1-based node ids in first-seen order; the writer emits those
/// ids back out.
use crate::graph::{BiPath, BidirectedGraph, Handle};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub fn load_gfa(path: &Path) -> Result<BidirectedGraph> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut graph = BidirectedGraph::new();
    let mut node_id_map: HashMap<String, usize> = HashMap::new();

    // links and paths may reference segments that appear later in the
    // file, so collect them and resolve after all S lines are read
    let mut pending_links: Vec<(String, String, String, String)> = Vec::new();
    let mut pending_paths: Vec<(String, String)> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('H') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            "S" => {
                if fields.len() < 3 {
                    return Err(Error::InvalidGfa(format!("truncated S line: {line}")));
                }
                let name = fields[1].to_string();
                let sequence = fields[2].as_bytes().to_vec();
                if node_id_map.contains_key(&name) {
                    return Err(Error::InvalidGfa(format!("duplicate segment: {name}")));
                }
                let id = graph.node_count() + 1;
                node_id_map.insert(name, id);
                graph.add_node(id, sequence);
            }
            "L" => {
                if fields.len() < 5 {
                    return Err(Error::InvalidGfa(format!("truncated L line: {line}")));
                }
                pending_links.push((
                    fields[1].to_string(),
                    fields[2].to_string(),
                    fields[3].to_string(),
                    fields[4].to_string(),
                ));
            }
            "P" => {
                if fields.len() < 3 {
                    return Err(Error::InvalidGfa(format!("truncated P line: {line}")));
                }
                pending_paths.push((fields[1].to_string(), fields[2].to_string()));
            }
            _ => {
                // other record types carry nothing the layout needs
            }
        }
    }

    for (from_name, from_orient, to_name, to_orient) in pending_links {
        let from = resolve_handle(&node_id_map, &from_name, &from_orient)?;
        let to = resolve_handle(&node_id_map, &to_name, &to_orient)?;
        graph.add_edge(from, to);
    }

    for (path_name, step_list) in pending_paths {
        let mut path = BiPath::new(path_name.clone());
        for step in step_list.split(',') {
            let step = step.trim();
            if step.is_empty() {
                continue;
            }
            let (name, orient) = match step.as_bytes().last() {
                Some(b'+') => (&step[..step.len() - 1], "+"),
                Some(b'-') => (&step[..step.len() - 1], "-"),
                _ => {
                    return Err(Error::InvalidGfa(format!(
                        "path {path_name}: step without orientation: {step}"
                    )))
                }
            };
            path.add_step(resolve_handle(&node_id_map, name, orient)?);
        }
        if !path.steps.is_empty() {
            graph.paths.push(path);
        }
    }

    Ok(graph)
}

fn resolve_handle(
    node_id_map: &HashMap<String, usize>,
    name: &str,
    orient: &str,
) -> Result<Handle> {
    let &id = node_id_map
        .get(name)
        .ok_or_else(|| Error::InvalidGfa(format!("unknown segment: {name}")))?;
    match orient {
        "+" => Ok(Handle::forward(id)),
        "-" => Ok(Handle::reverse(id)),
        other => Err(Error::InvalidGfa(format!(
            "bad orientation {other:?} for segment {name}"
        ))),
    }
}

pub fn write_gfa<W: Write>(graph: &BidirectedGraph, writer: &mut W) -> Result<()> {
    writeln!(writer, "H\tVN:Z:1.0")?;

    for handle in graph.handles() {
        writeln!(
            writer,
            "S\t{}\t{}",
            handle.node_id(),
            String::from_utf8_lossy(graph.sequence(handle))
        )?;
    }

    for edge in &graph.edges {
        writeln!(
            writer,
            "L\t{}\t{}\t{}\t{}\t0M",
            edge.from.node_id(),
            if edge.from.is_reverse() { '-' } else { '+' },
            edge.to.node_id(),
            if edge.to.is_reverse() { '-' } else { '+' },
        )?;
    }

    for path in &graph.paths {
        let steps: Vec<String> = path.steps.iter().map(|h| h.to_string()).collect();
        let overlaps = vec!["0M"; path.steps.len().saturating_sub(1)].join(",");
        writeln!(writer, "P\t{}\t{}\t{}", path.name, steps.join(","), overlaps)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_gfa(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn test_load_simple_gfa() {
        let gfa = "H\tVN:Z:1.0\n\
                   S\ts1\tAC\n\
                   S\ts2\tGGG\n\
                   S\ts3\tT\n\
                   L\ts1\t+\ts2\t+\t0M\n\
                   L\ts2\t+\ts3\t+\t0M\n\
                   P\tp\ts1+,s2+,s3+\t0M,0M\n";
        let file = write_temp_gfa(gfa);
        let graph = load_gfa(file.path()).expect("load");

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.paths.len(), 1);
        assert_eq!(graph.length(Handle::forward(2)), 3);
        assert_eq!(graph.paths[0].steps.len(), 3);
    }

    #[test]
    fn test_links_before_segments() {
        let gfa = "L\ta\t+\tb\t-\t0M\n\
                   S\ta\tAAAA\n\
                   S\tb\tCC\n";
        let file = write_temp_gfa(gfa);
        let graph = load_gfa(file.path()).expect("load");
        assert_eq!(graph.node_count(), 2);
        let edge = graph.edges.iter().next().unwrap();
        assert_eq!(edge.from, Handle::forward(1));
        assert_eq!(edge.to, Handle::reverse(2));
    }

    #[test]
    fn test_unknown_segment_is_an_error() {
        let gfa = "S\ta\tAAAA\nL\ta\t+\tmissing\t+\t0M\n";
        let file = write_temp_gfa(gfa);
        assert!(matches!(
            load_gfa(file.path()),
            Err(Error::InvalidGfa(_))
        ));
    }

    #[test]
    fn test_write_and_reload_round_trip() {
        let gfa = "S\tx\tACGT\nS\ty\tTTTT\nL\tx\t+\ty\t+\t0M\nP\tp\tx+,y-\t0M\n";
        let file = write_temp_gfa(gfa);
        let graph = load_gfa(file.path()).expect("load");

        let mut buffer = Vec::new();
        write_gfa(&graph, &mut buffer).expect("write");

        let out = write_temp_gfa(&String::from_utf8(buffer).unwrap());
        let reloaded = load_gfa(out.path()).expect("reload");
        assert_eq!(reloaded.node_count(), graph.node_count());
        assert_eq!(reloaded.edges.len(), graph.edges.len());
        assert_eq!(reloaded.paths.len(), graph.paths.len());
        assert_eq!(reloaded.paths[0].steps, graph.paths[0].steps);
    }
}
