use serde::Serialize;

/// Uniformly spaced integration times, from a run-up before day 1 through the
/// last requested day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    /// Time at which integration starts, relative to day 1.
    pub const RUN_UP_START: f64 = -30.0;

    /// Points `start, start + step, ...` up to and including `end` when it
    /// falls on the grid.
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        let count = if end >= start && step > 0.0 {
            // tolerance keeps `end` when (end - start) / step lands just under an integer
            ((end - start) / step + 1e-10).floor() as usize + 1
        } else {
            0
        };
        let points = (0..count).map(|i| start + i as f64 * step).collect();
        Self { points }
    }

    /// Grid from the run-up start through `last_day`.
    pub fn run_up_to(last_day: f64, step: f64) -> Self {
        Self::new(Self::RUN_UP_START, last_day, step)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<f64> {
        self.points.first().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.points
    }

    /// Largest index whose time is `<= day`.
    ///
    /// `day` must not precede the grid start; the grid is always built to
    /// reach the last requested day.
    pub fn closing_index(&self, day: f64) -> usize {
        self.points.partition_point(|&t| t <= day).saturating_sub(1)
    }

    /// Largest index whose time is `<= day - days_back`, or the first index
    /// when the window would open before the grid does.
    pub fn window_start_index(&self, day: f64, days_back: f64) -> usize {
        let opening = day - days_back;
        match self.points.partition_point(|&t| t <= opening) {
            0 => 0,
            n => n - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_bounds() {
        let grid = TimeGrid::run_up_to(42.0, 0.25);
        assert_eq!(grid.len(), 289);
        assert_eq!(grid.start(), Some(-30.0));
        assert_eq!(grid.as_slice().last().copied(), Some(42.0));

        let coarse = TimeGrid::new(0.0, 1.0, 0.3);
        assert_eq!(coarse.len(), 4);
    }

    #[test]
    fn test_closing_index() {
        let grid = TimeGrid::run_up_to(10.0, 0.25);
        let idx = grid.closing_index(1.0);
        assert_eq!(grid.as_slice()[idx], 1.0);
        let idx = grid.closing_index(1.1);
        assert_eq!(grid.as_slice()[idx], 1.0);
        assert_eq!(grid.closing_index(10.0), grid.len() - 1);
    }

    #[test]
    fn test_closing_index_monotone() {
        let grid = TimeGrid::run_up_to(60.0, 0.1);
        let mut previous = 0;
        for step in 0..=600 {
            let day = step as f64 * 0.1;
            let idx = grid.closing_index(day);
            assert!(idx < grid.len());
            assert!(idx >= previous);
            previous = idx;
        }
    }

    #[test]
    fn test_window_start_index() {
        let grid = TimeGrid::run_up_to(50.0, 0.25);
        for day in 1..=50 {
            let day = day as f64;
            for days_back in [0.0, 5.0, 30.0, 45.0] {
                let idx = grid.window_start_index(day, days_back);
                let opening = day - days_back;
                if opening < -30.0 {
                    assert_eq!(idx, 0);
                } else {
                    assert!(grid.as_slice()[idx] <= opening);
                    assert!(idx + 1 == grid.len() || grid.as_slice()[idx + 1] > opening);
                }
            }
        }
        assert_eq!(grid.window_start_index(1.0, 45.0), 0);
    }
}
