use glam::Vec3;

/// Uniform spatial hash grid for neighbor queries within one cell size.
///
/// Built with a counting sort: count entries per cell -> prefix sum ->
/// scatter. Only the entries handed to `build` are indexed, so callers can
/// leave out particles that should not interact.
pub struct SpatialHashGrid {
    inv_cell_size: f32,
    table_size: usize,
    /// Entries per cell; reused as scatter offsets during build.
    cell_count: Vec<u32>,
    /// First slot in `sorted_ids` for each cell.
    cell_start: Vec<u32>,
    /// Entry ids ordered by cell hash.
    sorted_ids: Vec<u32>,
    /// Scratch: (id, cell hash) pairs gathered during build.
    entries: Vec<(u32, u32)>,
}

impl SpatialHashGrid {
    /// `cell_size` should be at least the largest query distance.
    /// `table_size` is the number of hash buckets.
    pub fn new(cell_size: f32, table_size: usize) -> Self {
        let table_size = table_size.max(1);
        Self {
            inv_cell_size: 1.0 / cell_size.max(1.0e-4),
            table_size,
            cell_count: vec![0u32; table_size],
            cell_start: vec![0u32; table_size],
            sorted_ids: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Bucket count suited to `n` entries: next power of two of 2n, within
    /// [1024, 2^17].
    pub fn table_size_for(n: usize) -> usize {
        (n * 2).next_power_of_two().clamp(1024, 131072)
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.inv_cell_size = 1.0 / cell_size.max(1.0e-4);
    }

    /// Rebuild from `(id, position)` pairs.
    pub fn build(&mut self, points: impl Iterator<Item = (u32, Vec3)>) {
        self.entries.clear();
        self.cell_count.fill(0);

        for (id, pos) in points {
            let (cx, cy, cz) = self.cell_coords(pos);
            let h = self.hash_cell(cx, cy, cz);
            self.entries.push((id, h as u32));
            self.cell_count[h] += 1;
        }

        self.cell_start[0] = 0;
        for k in 1..self.table_size {
            self.cell_start[k] = self.cell_start[k - 1] + self.cell_count[k - 1];
        }

        self.cell_count.fill(0);
        self.sorted_ids.clear();
        self.sorted_ids.resize(self.entries.len(), 0);
        for &(id, h) in &self.entries {
            let h = h as usize;
            let slot = self.cell_start[h] + self.cell_count[h];
            self.sorted_ids[slot as usize] = id;
            self.cell_count[h] += 1;
        }
    }

    /// Call `callback(id)` for every entry in the 3x3x3 cells around `pos`.
    /// Each entry is reported at most once. Distance checks are up to the
    /// caller; hash collisions can report far entries.
    pub fn query_neighbors<F: FnMut(u32)>(&self, pos: Vec3, mut callback: F) {
        let (cx, cy, cz) = self.cell_coords(pos);
        let mut visited = [usize::MAX; 27];
        let mut n = 0;
        for dx in -1..=1_i32 {
            for dy in -1..=1_i32 {
                for dz in -1..=1_i32 {
                    let h = self.hash_cell(cx + dx, cy + dy, cz + dz);
                    // skip buckets already visited through a hash collision
                    if visited[..n].contains(&h) {
                        continue;
                    }
                    visited[n] = h;
                    n += 1;
                    let start = self.cell_start[h] as usize;
                    let end = start + self.cell_count[h] as usize;
                    for &id in &self.sorted_ids[start..end] {
                        callback(id);
                    }
                }
            }
        }
    }

    #[inline]
    fn hash_cell(&self, cx: i32, cy: i32, cz: i32) -> usize {
        let h = (cx as u32).wrapping_mul(73856093)
            ^ (cy as u32).wrapping_mul(19349663)
            ^ (cz as u32).wrapping_mul(83492791);
        (h as usize) % self.table_size
    }

    #[inline]
    fn cell_coords(&self, pos: Vec3) -> (i32, i32, i32) {
        (
            (pos.x * self.inv_cell_size).floor() as i32,
            (pos.y * self.inv_cell_size).floor() as i32,
            (pos.z * self.inv_cell_size).floor() as i32,
        )
    }
}
