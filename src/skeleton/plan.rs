use std::ops::Range;

use crate::error::DsparError;
use crate::transport::Rank;

/// The topology-relevant facts of a pipeline element: how many ranks it occupies, and which of
///  them (as offsets from its starting rank) receive its input and send its output.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ElementShape {
    pub processes_needed: u32,
    pub input_offset_ranks: Vec<Rank>,
    pub output_offset_ranks: Vec<Rank>,
}

impl ElementShape {
    /// a single rank that both receives and sends
    pub fn single() -> ElementShape {
        ElementShape {
            processes_needed: 1,
            input_offset_ranks: vec![0],
            output_offset_ranks: vec![0],
        }
    }

    fn validate(&self, element_index: usize) -> anyhow::Result<()> {
        if self.processes_needed == 0 {
            return Err(DsparError::configuration(format!("element {} needs zero processes", element_index)));
        }
        if let Some(offset) = self.input_offset_ranks.iter()
            .chain(self.output_offset_ranks.iter())
            .find(|&&o| o >= self.processes_needed)
        {
            return Err(DsparError::configuration(format!(
                "element {} has offset rank {} outside of its {} processes", element_index, offset, self.processes_needed)));
        }
        Ok(())
    }
}

/// One element's place in the topology. Every process computes the same plans from the same
///  composition, and runs the one whose rank range contains its own rank.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Plan {
    pub element_index: usize,
    pub starting_rank: Rank,
    pub processes: u32,
    /// the upstream element's output ranks; empty for the first element
    pub sources: Vec<Rank>,
    /// the downstream element's input ranks; empty for the last element
    pub targets: Vec<Rank>,
}

impl Plan {
    pub fn rank_range(&self) -> Range<Rank> {
        self.starting_rank..self.starting_rank + self.processes
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.rank_range().contains(&rank)
    }
}

fn shifted(offsets: &[Rank], starting_rank: Rank) -> Vec<Rank> {
    offsets.iter()
        .map(|o| starting_rank + o)
        .collect()
}

/// Allocates contiguous rank ranges to the elements in sequence, beginning at `starting_rank`,
///  and wires each element's sources and targets to its neighbours' output and input ranks.
pub fn compute_plans(shapes: &[ElementShape], starting_rank: Rank) -> anyhow::Result<Vec<Plan>> {
    if shapes.is_empty() {
        return Err(DsparError::configuration("a pipeline needs at least one element"));
    }

    let mut starting_ranks = Vec::with_capacity(shapes.len());
    let mut next_rank = starting_rank;
    for (idx, shape) in shapes.iter().enumerate() {
        shape.validate(idx)?;
        starting_ranks.push(next_rank);
        next_rank = next_rank.checked_add(shape.processes_needed)
            .ok_or_else(|| DsparError::configuration("the topology exceeds the rank space"))?;
    }

    let plans = shapes.iter()
        .enumerate()
        .map(|(idx, shape)| {
            let sources = match idx {
                0 => Vec::new(),
                _ => shifted(&shapes[idx - 1].output_offset_ranks, starting_ranks[idx - 1]),
            };
            let targets = match shapes.get(idx + 1) {
                Some(next) => shifted(&next.input_offset_ranks, starting_ranks[idx + 1]),
                None => Vec::new(),
            };
            Plan {
                element_index: idx,
                starting_rank: starting_ranks[idx],
                processes: shape.processes_needed,
                sources,
                targets,
            }
        })
        .collect();
    Ok(plans)
}

pub fn select_plan(plans: &[Plan], rank: Rank) -> Option<&Plan> {
    plans.iter()
        .find(|p| p.contains(rank))
}

pub fn total_processes_needed(shapes: &[ElementShape]) -> u32 {
    shapes.iter()
        .map(|s| s.processes_needed)
        .sum()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    fn farm_shape(workers: u32) -> ElementShape {
        ElementShape {
            processes_needed: workers + 2,
            input_offset_ranks: vec![0],
            output_offset_ranks: vec![1],
        }
    }

    #[test]
    fn test_single_element() {
        let plans = compute_plans(&[ElementShape::single()], 0).unwrap();
        assert_eq!(plans, vec![Plan {
            element_index: 0,
            starting_rank: 0,
            processes: 1,
            sources: vec![],
            targets: vec![],
        }]);
    }

    #[test]
    fn test_stage_farm_stage() {
        let plans = compute_plans(&[ElementShape::single(), farm_shape(3), ElementShape::single()], 0).unwrap();

        assert_eq!(plans[0].rank_range(), 0..1);
        assert_eq!(plans[0].sources, Vec::<Rank>::new());
        assert_eq!(plans[0].targets, vec![1]);

        assert_eq!(plans[1].rank_range(), 1..6);
        assert_eq!(plans[1].sources, vec![0]);
        assert_eq!(plans[1].targets, vec![6]);

        assert_eq!(plans[2].rank_range(), 6..7);
        assert_eq!(plans[2].sources, vec![2]);
        assert_eq!(plans[2].targets, Vec::<Rank>::new());
    }

    #[rstest]
    #[case::from_zero(vec![1, 4, 2, 1], 0)]
    #[case::with_offset(vec![3, 1, 5], 7)]
    #[case::single(vec![6], 2)]
    fn test_ranges_are_contiguous(#[case] processes: Vec<u32>, #[case] offset: Rank) {
        let shapes: Vec<_> = processes.iter()
            .map(|&p| ElementShape { processes_needed: p, input_offset_ranks: vec![0], output_offset_ranks: vec![p - 1] })
            .collect();
        let plans = compute_plans(&shapes, offset).unwrap();

        let mut expected_start = offset;
        for (idx, plan) in plans.iter().enumerate() {
            assert_eq!(plan.element_index, idx);
            assert_eq!(plan.rank_range(), expected_start..expected_start + processes[idx]);
            if idx > 0 {
                assert_eq!(plan.sources, vec![plans[idx - 1].rank_range().end - 1]);
            }
            if idx + 1 < plans.len() {
                assert_eq!(plan.targets, vec![plan.rank_range().end]);
            }
            expected_start += processes[idx];
        }
        assert_eq!(total_processes_needed(&shapes), processes.iter().sum::<u32>());
    }

    #[rstest]
    #[case::first(0, Some(0))]
    #[case::farm_start(1, Some(1))]
    #[case::farm_end(5, Some(1))]
    #[case::last(6, Some(2))]
    #[case::beyond(7, None)]
    fn test_select_plan(#[case] rank: Rank, #[case] expected: Option<usize>) {
        let plans = compute_plans(&[ElementShape::single(), farm_shape(3), ElementShape::single()], 0).unwrap();
        assert_eq!(select_plan(&plans, rank).map(|p| p.element_index), expected);
    }

    #[test]
    fn test_select_plan_below_offset() {
        let plans = compute_plans(&[ElementShape::single()], 3).unwrap();
        assert!(select_plan(&plans, 2).is_none());
        assert!(select_plan(&plans, 3).is_some());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::zero_processes(vec![ElementShape { processes_needed: 0, input_offset_ranks: vec![], output_offset_ranks: vec![] }])]
    #[case::input_offset_outside(vec![ElementShape { processes_needed: 2, input_offset_ranks: vec![2], output_offset_ranks: vec![0] }])]
    #[case::output_offset_outside(vec![ElementShape::single(), ElementShape { processes_needed: 1, input_offset_ranks: vec![0], output_offset_ranks: vec![1] }])]
    fn test_invalid_topology(#[case] shapes: Vec<ElementShape>) {
        let err = compute_plans(&shapes, 0).unwrap_err();
        assert!(matches!(err.downcast_ref::<DsparError>(), Some(DsparError::Configuration(_))));
    }
}
