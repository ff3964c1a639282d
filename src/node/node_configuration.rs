/// A node's flow-control policy, fixed when the node is created.
///
/// `ask_for_demand_upstream` and `wait_for_demand_downstream` select pull (demand-driven)
///  behavior on the respective side; without them a node consumes whatever arrives and
///  pushes its output round robin. `ordered` makes the node process items in id order.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct NodeConfiguration {
    pub ask_for_demand_upstream: bool,
    pub wait_for_demand_downstream: bool,
    pub ordered: bool,
}

impl NodeConfiguration {
    pub fn round_robin() -> NodeConfiguration {
        NodeConfiguration::default()
    }

    pub fn with_ordered(self, ordered: bool) -> NodeConfiguration {
        NodeConfiguration {
            ordered,
            ..self
        }
    }

    pub fn with_ask_for_demand_upstream(self, ask_for_demand_upstream: bool) -> NodeConfiguration {
        NodeConfiguration {
            ask_for_demand_upstream,
            ..self
        }
    }

    pub fn with_wait_for_demand_downstream(self, wait_for_demand_downstream: bool) -> NodeConfiguration {
        NodeConfiguration {
            wait_for_demand_downstream,
            ..self
        }
    }
}
