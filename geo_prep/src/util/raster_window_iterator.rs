/*
This file is part of the Connectivity Preprocessing Toolkit
Copyright (C) 2025 the Connectivity Preprocessing Toolkit authors

The Connectivity Preprocessing Toolkit is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use num::Integer;

/// Walks a raster in n_chunks x n_chunks windows, row major
pub struct RasterChunkIterator {
    num_rows: usize,
    num_cols: usize,

    rows_per_chunk: usize,
    cols_per_chunk: usize,

    num_col_chunks: usize,

    cur_step: usize,
    num_steps: usize,
}

#[derive(Debug)]
pub struct RasterWindow {
    //X, Y  or column, row order
    pub window_offset: (isize, isize),
    pub window_size: (usize, usize),

    pub current_step: usize,
    pub num_steps: usize,
}

impl RasterChunkIterator {
    pub fn new(num_rows: usize, num_cols: usize, n_chunks: usize) -> Self {
        assert!(num_rows > 0);
        assert!(num_cols > 0);
        assert!(n_chunks > 0);

        let rows_per_chunk = Integer::div_ceil(&num_rows, &n_chunks);
        let cols_per_chunk = Integer::div_ceil(&num_cols, &n_chunks);

        let num_row_chunks = Integer::div_ceil(&num_rows, &rows_per_chunk);
        let num_col_chunks = Integer::div_ceil(&num_cols, &cols_per_chunk);

        Self {
            num_rows,
            num_cols,
            rows_per_chunk,
            cols_per_chunk,
            num_col_chunks,
            cur_step: 0,
            num_steps: num_row_chunks * num_col_chunks,
        }
    }
}

impl Iterator for RasterChunkIterator {
    type Item = RasterWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_step >= self.num_steps {
            return None;
        }

        let chunk_col = self.cur_step % self.num_col_chunks;
        let chunk_row = self.cur_step / self.num_col_chunks;

        let x_start = chunk_col * self.cols_per_chunk;
        let y_start = chunk_row * self.rows_per_chunk;

        let width = self.cols_per_chunk.min(self.num_cols - x_start);
        let height = self.rows_per_chunk.min(self.num_rows - y_start);

        let r = Some(RasterWindow {
            window_offset: (x_start as isize, y_start as isize),
            window_size: (width, height),
            current_step: self.cur_step,
            num_steps: self.num_steps,
        });

        self.cur_step += 1;

        r
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let l = self.num_steps - self.cur_step;
        (l, Some(l))
    }
}

impl ExactSizeIterator for RasterChunkIterator {}
