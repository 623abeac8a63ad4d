// Copyright (c) 2019 The lathe developers
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;

use crate::alias::Alias;
use crate::error::{Error, NoPath};
use crate::stamp::DependencyType;

use super::Graph;

/// One link of a dependency chain. Each entry depends on the previous one
/// via the given edge type; the first entry is the destination itself and
/// carries `Root`.
pub type ChainLink = (Alias, DependencyType);

/// Every outgoing edge of a node, as (neighbor, type) pairs.
fn edges_of(graph: &Graph, alias: &Alias) -> Vec<ChainLink> {
    let node = match graph.find(alias) {
        Some(node) => node,
        None => return Vec::new(),
    };

    let inner = node.read();
    let mut edges = Vec::with_capacity(
        inner.static_deps.len()
            + inner.dynamic_deps.len()
            + inner.output_files.len()
            + inner.output_nodes.len(),
    );

    for dep in &inner.static_deps {
        edges.push((dep.alias.clone(), DependencyType::Static));
    }

    for dep in &inner.dynamic_deps {
        edges.push((dep.alias.clone(), DependencyType::Dynamic));
    }

    for dep in &inner.output_files {
        edges.push((dep.alias.clone(), DependencyType::OutputFile));
    }

    for alias in &inner.output_nodes {
        edges.push((alias.clone(), DependencyType::OutputNode));
    }

    edges
}

impl Graph {
    /// Finds the shortest dependency chain from `src` to `dst` across all
    /// edge flavors.
    ///
    /// This is Dijkstra over per-node weights; the default configuration
    /// passes a unit weight, which degenerates to a plain shortest hop
    /// count. The result starts at `dst` tagged `Root` and ends one hop
    /// before `src`; every other entry carries the type of the edge by
    /// which it depends on the entry before it.
    pub fn dependency_chain<W>(
        &self,
        src: &Alias,
        dst: &Alias,
        weight: W,
    ) -> Result<Vec<ChainLink>, Error>
    where
        W: Fn(&Alias) -> usize,
    {
        // Ensure both endpoints exist before searching.
        self.expect(src)?;
        self.expect(dst)?;

        let mut dist: HashMap<Alias, usize> = HashMap::new();
        let mut pred: HashMap<Alias, ChainLink> = HashMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(src.clone(), 0);
        heap.push(Reverse((0usize, src.clone())));

        while let Some(Reverse((cost, alias))) = heap.pop() {
            if alias == *dst {
                break;
            }

            if cost > *dist.get(&alias).unwrap_or(&usize::max_value()) {
                continue;
            }

            for (neighbor, dep_type) in edges_of(self, &alias) {
                let next = cost + weight(&neighbor);

                if next
                    < *dist.get(&neighbor).unwrap_or(&usize::max_value())
                {
                    dist.insert(neighbor.clone(), next);
                    pred.insert(
                        neighbor.clone(),
                        (alias.clone(), dep_type),
                    );
                    heap.push(Reverse((next, neighbor)));
                }
            }
        }

        if !pred.contains_key(dst) && src != dst {
            return Err(NoPath {
                src: src.clone(),
                dst: dst.clone(),
            }
            .into());
        }

        // Walk back from the destination, stopping one hop before `src`.
        let mut chain = vec![(dst.clone(), DependencyType::Root)];
        let mut cursor = dst.clone();

        while let Some((prev, dep_type)) = pred.get(&cursor) {
            if prev == src {
                break;
            }

            chain.push((prev.clone(), *dep_type));
            cursor = prev.clone();
        }

        Ok(chain)
    }

    /// Collects the on-disk *input* files reachable from the given roots
    /// over static and dynamic edges. When `recursive` is false only the
    /// roots themselves are expanded one level; otherwise the whole
    /// transitive closure is walked. Output files are deliberately not
    /// followed here; they are a different roll-up (see
    /// `dependency_output_files`).
    pub fn dependency_input_files<'a, I>(
        &self,
        recursive: bool,
        roots: I,
    ) -> Result<Vec<PathBuf>, Error>
    where
        I: IntoIterator<Item = &'a Alias>,
    {
        let mut files = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(Alias, bool)> = Vec::new();

        for root in roots {
            self.expect(root)?;
            stack.push((root.clone(), true));
        }

        while let Some((alias, expand)) = stack.pop() {
            if !visited.insert(alias.clone()) {
                continue;
            }

            if let Some(node) = self.find(&alias) {
                let inner = node.read();

                if let Some(path) = inner
                    .buildable
                    .source_path()
                    .or_else(|| inner.buildable.generated_path())
                {
                    files.push(path.to_path_buf());
                }

                if expand {
                    for dep in
                        inner.static_deps.iter().chain(&inner.dynamic_deps)
                    {
                        stack.push((dep.alias.clone(), recursive));
                    }
                }
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Collects the on-disk *output* files reachable from the given roots
    /// over output-file and output-node edges.
    pub fn dependency_output_files<'a, I>(
        &self,
        roots: I,
    ) -> Result<Vec<PathBuf>, Error>
    where
        I: IntoIterator<Item = &'a Alias>,
    {
        let mut files = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<Alias> = Vec::new();

        for root in roots {
            self.expect(root)?;
            stack.push(root.clone());
        }

        while let Some(alias) = stack.pop() {
            if !visited.insert(alias.clone()) {
                continue;
            }

            if let Some(node) = self.find(&alias) {
                let inner = node.read();

                if let Some(path) = inner.buildable.generated_path() {
                    files.push(path.to_path_buf());
                }

                for dep in &inner.output_files {
                    stack.push(dep.alias.clone());
                }

                for out in &inner.output_nodes {
                    stack.push(out.clone());
                }
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildable::{Any, Buildable, GeneratedFile, Group, SourceFile};
    use crate::stamp::BuildDependency;

    fn group(name: &str, members: Vec<Alias>) -> Any {
        Group::new(name, members).into()
    }

    /// a -> b -> c as static edges.
    fn diamond() -> (Graph, Alias, Alias, Alias) {
        let graph = Graph::new();

        let c = Alias::new("group", "c").unwrap();
        let b = Alias::new("group", "b").unwrap();
        let a = Alias::new("group", "a").unwrap();

        graph.create(group("c", Vec::new()), Vec::new()).unwrap();
        graph
            .create(group("b", Vec::new()), vec![c.clone()])
            .unwrap();
        graph
            .create(group("a", Vec::new()), vec![b.clone()])
            .unwrap();

        (graph, a, b, c)
    }

    #[test]
    fn chain_starts_at_destination_root() {
        let (graph, a, b, c) = diamond();

        let chain = graph.dependency_chain(&a, &c, |_| 1).unwrap();

        assert_eq!(
            chain,
            vec![
                (c, DependencyType::Root),
                (b, DependencyType::Static),
            ]
        );
        // `a` itself never appears.
        assert!(!chain.iter().any(|(alias, _)| *alias == a));
    }

    #[test]
    fn chain_unreachable_is_no_path() {
        let (graph, a, _, c) = diamond();

        // Backwards: c has no edges at all.
        let err = graph.dependency_chain(&c, &a, |_| 1).unwrap_err();
        assert!(err.downcast_ref::<NoPath>().is_some());
    }

    #[test]
    fn input_files_walk_static_and_dynamic() {
        let graph = Graph::new();

        let src: Any = SourceFile::new("src/a.c").into();
        let src_alias = src.alias();
        graph.create(src, Vec::new()).unwrap();

        let root = Alias::new("group", "all").unwrap();
        graph
            .create(group("all", Vec::new()), vec![src_alias])
            .unwrap();

        let files =
            graph.dependency_input_files(true, &[root.clone()]).unwrap();
        assert_eq!(files, vec![PathBuf::from("src/a.c")]);

        // Non-recursive still expands the roots one level.
        let files =
            graph.dependency_input_files(false, &[root]).unwrap();
        assert_eq!(files, vec![PathBuf::from("src/a.c")]);
    }

    #[test]
    fn output_files_walk_output_edges() {
        let graph = Graph::new();

        let gen: Any = GeneratedFile::new("out/a.o").into();
        let gen_alias = gen.alias();
        graph.create(gen, Vec::new()).unwrap();

        let producer = Alias::new("group", "producer").unwrap();
        let (node, _) =
            graph.create(group("producer", Vec::new()), Vec::new()).unwrap();

        node.write().record_output_file(
            &producer,
            BuildDependency::unstamped(gen_alias),
        );

        let files = graph.dependency_output_files(&[producer]).unwrap();
        assert_eq!(files, vec![PathBuf::from("out/a.o")]);
    }
}
