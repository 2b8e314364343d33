//! Arithmetic on piecewise-linear marginal cost curves.
//!
//! A curve is a set of [`Vertex`] values. Read along the price axis it is a
//! supply function: the power a model delivers at a given marginal price.
//! Read along the power axis it is a marginal cost function, whose integral is
//! the production cost. Net power of a market is the sum of its models'
//! supply functions, which is non-decreasing in price; the clearing price is
//! where that sum crosses zero.

use tns_core::models::{Vertex, sort_by_power};

fn by_price(vertices: &[Vertex]) -> Vec<&Vertex> {
    let mut sorted = vertices.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.cmp_price(b));
    sorted
}

/// Power on the segment leaving `from` evaluated at `price`.
fn along(from: &Vertex, to: &Vertex, price: f64) -> f64 {
    if !from.continuity || from.marginal_price.is_infinite() || to.marginal_price.is_infinite() {
        from.power
    } else {
        let span = to.marginal_price - from.marginal_price;
        from.power + (price - from.marginal_price) * (to.power - from.power) / span
    }
}

/// The power a curve delivers at `price`, taking the right limit at jumps.
///
/// Below the lowest vertex price the curve holds its first power, above the
/// highest it holds its last.
pub fn production(vertices: &[Vertex], price: f64) -> f64 {
    match vertices {
        [] => 0.0,
        [vertex] => vertex.power,
        _ => {
            let sorted = by_price(vertices);
            let last = sorted[sorted.len() - 1];
            if price < sorted[0].marginal_price {
                return sorted[0].power;
            }
            if price >= last.marginal_price {
                return last.power;
            }
            // the last vertex at or below the price; never the final one here
            let k = sorted.partition_point(|v| v.marginal_price <= price) - 1;
            along(sorted[k], sorted[k + 1], price)
        }
    }
}

/// The power a curve delivers just below `price`, taking the left limit at jumps.
pub fn production_left(vertices: &[Vertex], price: f64) -> f64 {
    match vertices {
        [] => 0.0,
        [vertex] => vertex.power,
        _ => {
            let sorted = by_price(vertices);
            let last = sorted[sorted.len() - 1];
            if price <= sorted[0].marginal_price {
                return sorted[0].power;
            }
            if price > last.marginal_price {
                return last.power;
            }
            // the first vertex at or above the price, preceded by at least one below it
            let k = sorted.partition_point(|v| v.marginal_price < price);
            let (prev, at) = (sorted[k - 1], sorted[k]);
            if at.marginal_price == price {
                let jump = !prev.continuity
                    || prev.marginal_price.is_infinite()
                    || at.marginal_price.is_infinite();
                if jump { prev.power } else { at.power }
            } else {
                along(prev, at, price)
            }
        }
    }
}

/// Fill in cumulative costs for a curve given only prices and powers.
///
/// Costs integrate marginal price over power. The curve is anchored so that
/// zero power costs nothing when zero lies in its domain; otherwise the
/// first vertex is priced as if its marginal price held all the way from
/// zero. Segments without a usable price contribute nothing.
pub fn integrate_costs(vertices: &mut [Vertex]) {
    if vertices.is_empty() {
        return;
    }
    sort_by_power(vertices);

    let finite = |price: f64| if price.is_finite() { price } else { 0.0 };
    vertices[0].cost = finite(vertices[0].marginal_price) * vertices[0].power;
    for i in 1..vertices.len() {
        let (a, b) = (&vertices[i - 1], &vertices[i]);
        let width = b.power - a.power;
        let area = if !a.continuity || a.marginal_price.is_infinite() || b.marginal_price.is_infinite() {
            finite(a.marginal_price) * width
        } else {
            width * (a.marginal_price + b.marginal_price) / 2.0
        };
        let cost = a.cost + area;
        vertices[i].cost = cost;
    }

    let (first, last) = (vertices[0].power, vertices[vertices.len() - 1].power);
    if first <= 0.0 && 0.0 <= last {
        let offset = production_cost(vertices, 0.0);
        for vertex in vertices.iter_mut() {
            vertex.cost -= offset;
        }
    }
}

/// The production cost rate of delivering `power` on this curve.
///
/// Vertex costs are cumulative, so the cost at a point inside a segment adds
/// the area under the (linear) marginal price between the segment start and
/// that point. Discontinuous, vertical or infinitely-priced segments carry no
/// area, and the nearer vertex's cost is used instead. Power outside the
/// curve's domain is clamped to it.
pub fn production_cost(vertices: &[Vertex], power: f64) -> f64 {
    match vertices {
        [] => 0.0,
        [vertex] => vertex.cost,
        _ => {
            let mut sorted = vertices.to_vec();
            sort_by_power(&mut sorted);
            let first = &sorted[0];
            let last = &sorted[sorted.len() - 1];
            if power <= first.power {
                return first.cost;
            }
            if power >= last.power {
                return last.cost;
            }

            let k = sorted.partition_point(|v| v.power <= power) - 1;
            let (a, b) = (&sorted[k], &sorted[k + 1]);
            let width = b.power - a.power;
            let flat = !a.continuity
                || width == 0.0
                || a.marginal_price.is_infinite()
                || b.marginal_price.is_infinite();
            if flat {
                return if power - a.power <= b.power - power {
                    a.cost
                } else {
                    b.cost
                };
            }

            let t = (power - a.power) / width;
            let price = a.marginal_price + t * (b.marginal_price - a.marginal_price);
            a.cost + (power - a.power) * (a.marginal_price + price) / 2.0
        }
    }
}

/// Every finite marginal price appearing in `curves`, ascending and de-duplicated
pub fn breakpoints<'a>(curves: impl IntoIterator<Item = &'a [Vertex]>) -> Vec<f64> {
    let mut prices = curves
        .into_iter()
        .flat_map(|curve| curve.iter().map(|vertex| vertex.marginal_price))
        .filter(|price| price.is_finite())
        .collect::<Vec<_>>();
    prices.sort_by(f64::total_cmp);
    prices.dedup();
    prices
}

/// The price at which the summed production of `curves` is zero.
///
/// Net production is evaluated on both sides of every breakpoint. The result
/// is the breakpoint whose jump contains zero, a linear interpolation between
/// two adjacent breakpoints, or the extreme breakpoint when the market is in
/// surplus (lowest) or shortage (highest) everywhere. Without any finite
/// price `fallback` is returned.
pub fn clearing_price(curves: &[&[Vertex]], fallback: f64) -> f64 {
    let prices = breakpoints(curves.iter().copied());
    let Some(&lowest) = prices.first() else {
        return fallback;
    };

    let net_lo = |price| curves.iter().map(|c| production_left(c, price)).sum::<f64>();
    let net_hi = |price| curves.iter().map(|c| production(c, price)).sum::<f64>();

    if net_lo(lowest) >= 0.0 {
        return lowest;
    }

    for (i, &price) in prices.iter().enumerate() {
        let hi = net_hi(price);
        if net_lo(price) <= 0.0 && 0.0 <= hi {
            return price;
        }
        if let Some(&next) = prices.get(i + 1) {
            let lo_next = net_lo(next);
            if hi < 0.0 && 0.0 < lo_next {
                return price + (next - price) * (-hi) / (lo_next - hi);
            }
        }
    }

    prices[prices.len() - 1]
}

/// Sum several curves into one.
///
/// The result has a vertex on each side of every breakpoint of the inputs,
/// carrying the summed power and the summed production cost. Where the sum
/// holds its power across a breakpoint interval, the vertex is flagged as a
/// discontinuity. If no input has a finite price, the sum is a single hard
/// limit at the total fixed power.
pub fn aggregate(curves: &[&[Vertex]]) -> Vec<Vertex> {
    let prices = breakpoints(curves.iter().copied());
    if prices.is_empty() {
        let (cost, power) = curves.iter().fold((0.0, 0.0), |(cost, power), curve| {
            let p = production(curve, f64::INFINITY);
            (cost + production_cost(curve, p), power + p)
        });
        return if curves.iter().all(|curve| curve.is_empty()) {
            Vec::new()
        } else {
            vec![Vertex::new(f64::INFINITY, cost, power)]
        };
    }

    let point = |price: f64, left: bool| {
        curves.iter().fold((0.0, 0.0), |(cost, power), curve| {
            let p = if left {
                production_left(curve, price)
            } else {
                production(curve, price)
            };
            (cost + production_cost(curve, p), power + p)
        })
    };

    let mut result: Vec<Vertex> = Vec::with_capacity(2 * prices.len());
    for price in prices {
        let (cost_lo, lo) = point(price, true);
        let (cost_hi, hi) = point(price, false);
        result.push(Vertex::new(price, cost_lo, lo));
        if hi != lo {
            result.push(Vertex::new(price, cost_hi, hi));
        }
    }

    for i in 0..result.len().saturating_sub(1) {
        let next = &result[i + 1];
        let step = next.power == result[i].power && next.marginal_price > result[i].marginal_price;
        if step {
            result[i].continuity = false;
        }
    }
    result
}

/// The system curve of a market: the aggregate ordered by power, without repeats.
pub fn system_vertices(curves: &[&[Vertex]]) -> Vec<Vertex> {
    let mut vertices = aggregate(curves);
    sort_by_power(&mut vertices);
    vertices.dedup_by(|a, b| a.power == b.power && a.marginal_price == b.marginal_price);
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::*;

    #[fixture]
    fn supply() -> Vec<Vertex> {
        vec![Vertex::new(0.0, 0.0, 0.0), Vertex::new(0.05, 2.5, 100.0)]
    }

    #[rstest]
    #[case(-1.0, 0.0)]
    #[case(0.0, 0.0)]
    #[case(0.03, 60.0)]
    #[case(0.05, 100.0)]
    #[case(1.0, 100.0)]
    fn production_interpolates_and_clamps(supply: Vec<Vertex>, #[case] price: f64, #[case] power: f64) {
        assert_abs_diff_eq!(production(&supply, price), power, epsilon = 1e-9);
        assert_abs_diff_eq!(production_left(&supply, price), power, epsilon = 1e-9);
    }

    #[test]
    fn jump_has_two_limits() {
        let curve = vec![
            Vertex::new(0.02, 0.0, 0.0),
            Vertex::new(0.04, 0.0, 0.0),
            Vertex::new(0.04, 2.0, 50.0),
        ];
        assert_eq!(production_left(&curve, 0.04), 0.0);
        assert_eq!(production(&curve, 0.04), 50.0);
        assert_eq!(production(&curve, 0.03), 0.0);
    }

    #[test]
    fn discontinuity_holds_power() {
        let curve = vec![
            Vertex::new(0.02, 0.0, 10.0).with_continuity(false),
            Vertex::new(0.04, 0.0, 20.0),
        ];
        assert_eq!(production(&curve, 0.03), 10.0);
        assert_eq!(production_left(&curve, 0.04), 10.0);
        assert_eq!(production(&curve, 0.04), 20.0);
    }

    #[test]
    fn degenerate_curves() {
        assert_eq!(production(&[], 0.1), 0.0);
        assert_eq!(production(&[Vertex::hard_limit(-60.0)], 0.1), -60.0);
        assert_eq!(production_cost(&[], 10.0), 0.0);
        assert_eq!(production_cost(&[Vertex::new(0.1, 3.0, 5.0)], 10.0), 3.0);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(60.0, 0.0 + 60.0 * (0.0 + 0.03) / 2.0)]
    #[case(100.0, 2.5)]
    #[case(150.0, 2.5)]
    fn cost_is_the_area_under_marginal_price(supply: Vec<Vertex>, #[case] power: f64, #[case] cost: f64) {
        assert_abs_diff_eq!(production_cost(&supply, power), cost, epsilon = 1e-9);
    }

    #[rstest]
    fn clearing_interpolates_between_breakpoints(supply: Vec<Vertex>) {
        let load = vec![Vertex::hard_limit(-60.0)];
        let price = clearing_price(&[&supply, &load], 0.05);
        assert_abs_diff_eq!(price, 0.03, epsilon = 1e-12);
    }

    #[rstest]
    fn surplus_clears_at_lowest_price(supply: Vec<Vertex>) {
        assert_eq!(clearing_price(&[&supply], 0.05), 0.0);
    }

    #[rstest]
    fn shortage_clears_at_highest_price(supply: Vec<Vertex>) {
        let load = vec![Vertex::hard_limit(-500.0)];
        assert_eq!(clearing_price(&[&supply, &load], 0.05), 0.05);
    }

    #[test]
    fn clearing_inside_a_jump() {
        let step = vec![Vertex::new(0.04, 0.0, 0.0), Vertex::new(0.04, 4.0, 100.0)];
        let load = vec![Vertex::hard_limit(-30.0)];
        assert_eq!(clearing_price(&[&step, &load], 0.05), 0.04);
    }

    #[test]
    fn no_finite_price_keeps_fallback() {
        let load = vec![Vertex::hard_limit(-30.0)];
        assert_eq!(clearing_price(&[&load], 0.07), 0.07);
    }

    #[rstest]
    fn aggregate_sums_powers_and_costs(supply: Vec<Vertex>) {
        let load = vec![Vertex::hard_limit(-60.0)];
        let sum = aggregate(&[&supply, &load]);
        assert_eq!(sum.len(), 2);
        assert_eq!((sum[0].marginal_price, sum[0].power), (0.0, -60.0));
        assert_eq!((sum[1].marginal_price, sum[1].power), (0.05, 40.0));
        assert_abs_diff_eq!(sum[1].cost, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn aggregate_of_hard_limits_is_a_hard_limit() {
        let a = vec![Vertex::hard_limit(-60.0)];
        let b = vec![Vertex::hard_limit(-15.0)];
        let sum = aggregate(&[&a, &b]);
        assert_eq!(sum, vec![Vertex::hard_limit(-75.0)]);
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn aggregate_marks_flat_steps() {
        let step = vec![Vertex::new(0.02, 0.0, 0.0), Vertex::new(0.04, 0.0, 0.0), Vertex::new(0.04, 4.0, 100.0)];
        let sum = aggregate(&[&step]);
        assert_eq!(sum.len(), 3);
        assert!(!sum[0].continuity);
        assert!(sum[1].continuity);
        assert_eq!(production(&sum, 0.03), 0.0);
        assert_eq!(production(&sum, 0.04), 100.0);
    }

    #[test]
    fn integrated_costs_vanish_at_zero_power() {
        let mut curve = vec![
            Vertex::new(0.15, 0.0, 0.0),
            Vertex::new(0.0, 0.0, -3000.0),
            Vertex::new(0.05, 0.0, -1000.0),
        ];
        integrate_costs(&mut curve);
        let costs = curve.iter().map(|v| v.cost).collect::<Vec<_>>();
        assert_abs_diff_eq!(costs[0], -150.0, epsilon = 1e-9);
        assert_abs_diff_eq!(costs[1], -100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(costs[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn vertical_supply_steps_at_its_price() {
        let curve = vec![Vertex::new(0.03, 0.0, 100.0), Vertex::new(0.03, 0.0, 900.0)];
        assert_eq!(production(&curve, 0.01), 100.0);
        assert_eq!(production_left(&curve, 0.03), 100.0);
        assert_eq!(production(&curve, 0.03), 900.0);
    }

    #[rstest]
    fn system_vertices_are_ordered_by_power(supply: Vec<Vertex>) {
        let load = vec![Vertex::hard_limit(-60.0)];
        let vertices = system_vertices(&[&supply, &load, &supply]);
        assert!(vertices.windows(2).all(|w| w[0].power <= w[1].power));
        assert_eq!(vertices.last().map(|v| v.power), Some(140.0));
    }
}
