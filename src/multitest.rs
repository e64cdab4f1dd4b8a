/// Holm step-down adjustment.
///
/// Non-finite p-values are left unadjusted (`None`) and do not count toward the
/// family size.
pub fn holm(p_values: &[f64]) -> Vec<Option<f64>> {
    let mut order: Vec<usize> = (0..p_values.len())
        .filter(|&i| p_values[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let m = order.len();
    let mut adjusted = vec![None; p_values.len()];
    let mut running_max: f64 = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        let candidate = ((m - rank) as f64 * p_values[idx]).min(1.0);
        running_max = running_max.max(candidate);
        adjusted[idx] = Some(running_max);
    }
    adjusted
}
