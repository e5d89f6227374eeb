use cartograph_types::Point2d;

use super::SubPath;

/// Splits the path into dashes.
///
/// `pattern` lists lengths of dashes and gaps alternately, starting with a dash. A pattern with an
/// odd number of values is repeated twice (as in SVG). `offset` shifts the start of the pattern
/// along the path. Returned sub-paths are never closed.
pub fn dash_path(path: &SubPath, pattern: &[f64], offset: f64) -> Vec<SubPath> {
    let mut pattern: Vec<f64> = pattern.iter().map(|v| v.max(0.0)).collect();
    if pattern.len() % 2 == 1 {
        pattern.extend_from_within(..);
    }

    let total: f64 = pattern.iter().sum();
    if pattern.is_empty() || total <= 0.0 {
        return vec![path.clone()];
    }

    let mut index = 0;
    let mut remaining = pattern[0];
    let mut shift = offset.rem_euclid(total);
    while shift > 0.0 {
        if shift < remaining {
            remaining -= shift;
            break;
        }
        shift -= remaining;
        index = (index + 1) % pattern.len();
        remaining = pattern[index];
    }

    let line = path.to_line();
    let mut result = vec![];
    let mut current: Vec<Point2d> = match line.first() {
        Some(first) if index % 2 == 0 => vec![*first],
        _ => vec![],
    };

    for segment in line.windows(2) {
        let (a, b) = (segment[0], segment[1]);
        let length = (b - a).norm();
        let mut position = 0.0;
        while length - position > remaining {
            position += remaining;
            let p = a + (b - a) * (position / length);
            if index % 2 == 0 {
                current.push(p);
                if current.len() > 1 {
                    result.push(SubPath::new(std::mem::take(&mut current), false));
                }
                current.clear();
            } else {
                current = vec![p];
            }

            index = (index + 1) % pattern.len();
            remaining = pattern[index];
        }

        remaining -= length - position;
        if index % 2 == 0 {
            current.push(b);
        }
    }

    if current.len() > 1 {
        result.push(SubPath::new(current, false));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(length: f64) -> SubPath {
        SubPath::new(vec![Point2d::new(0.0, 0.0), Point2d::new(length, 0.0)], false)
    }

    #[test]
    fn regular_dashes() {
        let dashes = dash_path(&line(16.0), &[4.0, 4.0], 0.0);
        let starts: Vec<f64> = dashes.iter().map(|d| d.points[0].x).collect();
        let ends: Vec<f64> = dashes.iter().map(|d| d.points[d.points.len() - 1].x).collect();
        assert_eq!(starts, vec![0.0, 8.0]);
        assert_eq!(ends, vec![4.0, 12.0]);
    }

    #[test]
    fn dashes_follow_corners() {
        let path = SubPath::new(
            vec![Point2d::new(0.0, 0.0), Point2d::new(2.0, 0.0), Point2d::new(2.0, 4.0)],
            false,
        );
        let dashes = dash_path(&path, &[3.0, 1.0], 0.0);
        assert_eq!(
            dashes[0].points,
            vec![Point2d::new(0.0, 0.0), Point2d::new(2.0, 0.0), Point2d::new(2.0, 1.0)]
        );
        assert_eq!(dashes[1].points, vec![Point2d::new(2.0, 2.0), Point2d::new(2.0, 4.0)]);
    }

    #[test]
    fn offset_and_odd_pattern() {
        let dashes = dash_path(&line(10.0), &[3.0], 1.0);
        assert_eq!(dashes[0].points, vec![Point2d::new(0.0, 0.0), Point2d::new(2.0, 0.0)]);
        assert_eq!(dashes[1].points, vec![Point2d::new(5.0, 0.0), Point2d::new(8.0, 0.0)]);

        assert_eq!(dash_path(&line(10.0), &[0.0, 0.0], 0.0), vec![line(10.0)]);
    }
}
