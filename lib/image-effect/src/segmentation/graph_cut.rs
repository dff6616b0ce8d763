//! s-t minimum cut on an 8-connected pixel grid (Dinic's algorithm).
//! Source side is foreground.

use std::collections::VecDeque;

const EPS: f32 = 1e-4;
const UNVISITED: u32 = u32::MAX;

/// Neighbour offsets; the reverse of direction `d` is `(d + 4) % 8`.
pub(crate) const OFFSETS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

pub(crate) struct GridGraph {
    width: usize,
    height: usize,
    source: Vec<f32>,
    sink: Vec<f32>,
    edges: Vec<[f32; 8]>,
}

impl GridGraph {
    pub fn new(width: usize, height: usize) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            source: vec![0.0; n],
            sink: vec![0.0; n],
            edges: vec![[0.0; 8]; n],
        }
    }

    pub fn neighbour(&self, node: usize, dir: usize) -> Option<usize> {
        let (dx, dy) = OFFSETS[dir];
        let x = (node % self.width) as i64 + dx;
        let y = (node / self.width) as i64 + dy;

        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn set_terminals(&mut self, node: usize, source: f32, sink: f32) {
        self.source[node] = source.max(0.0);
        self.sink[node] = sink.max(0.0);
    }

    /// Symmetric capacity between `node` and its neighbour in direction `dir`.
    pub fn set_edge(&mut self, node: usize, dir: usize, capacity: f32) {
        if let Some(other) = self.neighbour(node, dir) {
            self.edges[node][dir] = capacity.max(0.0);
            self.edges[other][(dir + 4) % 8] = capacity.max(0.0);
        }
    }

    pub fn max_flow(&mut self) -> f64 {
        let n = self.source.len();

        // source -> p -> sink paths of length one
        let mut flow = 0f64;
        for p in 0..n {
            let direct = self.source[p].min(self.sink[p]);
            self.source[p] -= direct;
            self.sink[p] -= direct;
            flow += direct as f64;
        }

        let mut level = vec![UNVISITED; n];
        let mut cursor = vec![0u8; n];

        loop {
            let Some(sink_level) = self.build_levels(&mut level) else {
                break;
            };
            cursor.fill(0);

            for start in 0..n {
                while level[start] == 1 && self.source[start] > EPS {
                    let pushed = self.augment(start, &mut level, &mut cursor, sink_level);
                    if pushed <= 0.0 {
                        break;
                    }
                    flow += pushed as f64;
                }
            }
        }

        flow
    }

    /// Nodes still reachable from the source in the residual graph.
    pub fn source_side(&self) -> Vec<bool> {
        let mut reached = vec![false; self.source.len()];
        let mut queue = VecDeque::new();

        for (p, capacity) in self.source.iter().enumerate() {
            if *capacity > EPS {
                reached[p] = true;
                queue.push_back(p);
            }
        }

        while let Some(p) = queue.pop_front() {
            for dir in 0..8 {
                if self.edges[p][dir] <= EPS {
                    continue;
                }
                if let Some(q) = self.neighbour(p, dir)
                    && !reached[q]
                {
                    reached[q] = true;
                    queue.push_back(q);
                }
            }
        }

        reached
    }

    // BFS layering; the source sits at level 0 and the returned value is the sink level.
    fn build_levels(&self, level: &mut [u32]) -> Option<u32> {
        level.fill(UNVISITED);
        let mut queue = VecDeque::new();

        for (p, capacity) in self.source.iter().enumerate() {
            if *capacity > EPS {
                level[p] = 1;
                queue.push_back(p);
            }
        }

        let mut sink_level = None;
        while let Some(p) = queue.pop_front() {
            if let Some(limit) = sink_level
                && level[p] + 1 >= limit
            {
                continue;
            }

            if self.sink[p] > EPS {
                sink_level = Some(level[p] + 1);
                continue;
            }

            for dir in 0..8 {
                if self.edges[p][dir] <= EPS {
                    continue;
                }
                if let Some(q) = self.neighbour(p, dir)
                    && level[q] == UNVISITED
                {
                    level[q] = level[p] + 1;
                    queue.push_back(q);
                }
            }
        }

        sink_level
    }

    fn augment(&mut self, start: usize, level: &mut [u32], cursor: &mut [u8], sink_level: u32) -> f32 {
        let mut path: Vec<(usize, usize)> = vec![];
        let mut node = start;

        loop {
            if level[node] + 1 == sink_level && self.sink[node] > EPS {
                let mut pushed = self.source[start].min(self.sink[node]);
                for &(p, dir) in &path {
                    pushed = pushed.min(self.edges[p][dir]);
                }

                for &(p, dir) in &path {
                    self.edges[p][dir] -= pushed;
                    if let Some(q) = self.neighbour(p, dir) {
                        self.edges[q][(dir + 4) % 8] += pushed;
                    }
                }
                self.sink[node] -= pushed;
                self.source[start] -= pushed;
                return pushed;
            }

            let mut next = None;
            while (cursor[node] as usize) < 8 {
                let dir = cursor[node] as usize;
                if self.edges[node][dir] > EPS
                    && let Some(q) = self.neighbour(node, dir)
                    && level[q] == level[node] + 1
                    && level[q] < sink_level
                {
                    next = Some((dir, q));
                    break;
                }
                cursor[node] += 1;
            }

            match next {
                Some((dir, q)) => {
                    path.push((node, dir));
                    node = q;
                }
                None => {
                    // dead end for the rest of this phase
                    level[node] = UNVISITED;
                    match path.pop() {
                        Some((parent, _)) => {
                            cursor[parent] += 1;
                            node = parent;
                        }
                        None => return 0.0,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pixel_takes_cheaper_side() {
        let mut graph = GridGraph::new(1, 1);
        graph.set_terminals(0, 3.0, 1.0);
        assert!((graph.max_flow() - 1.0).abs() < 1e-6);
        assert_eq!(graph.source_side(), vec![true]);
    }

    #[test]
    fn test_cut_follows_weak_edge() {
        // 4x1 chain: left pinned to source, right pinned to sink,
        // the weakest link sits between x=2 and x=3
        let mut graph = GridGraph::new(4, 1);
        graph.set_terminals(0, 100.0, 0.0);
        graph.set_terminals(3, 0.0, 100.0);
        graph.set_edge(0, 0, 5.0);
        graph.set_edge(1, 0, 4.0);
        graph.set_edge(2, 0, 1.0);

        assert!((graph.max_flow() - 1.0).abs() < 1e-4);
        assert_eq!(graph.source_side(), vec![true, true, true, false]);
    }

    #[test]
    fn test_neighbours_stay_inside_grid() {
        let graph = GridGraph::new(3, 2);
        assert_eq!(graph.neighbour(0, 0), Some(1));
        assert_eq!(graph.neighbour(0, 4), None);
        assert_eq!(graph.neighbour(0, 1), Some(4));
        assert_eq!(graph.neighbour(5, 2), None);
        assert_eq!(graph.neighbour(4, 7), Some(2));
    }
}
