use async_trait::async_trait;
use tracing::debug;

use crate::protocol::message_header::{MessageHeader, MessageType};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NodeState {
    Created,
    Started,
    ReceivingMessages,
    Stopped,
}

/// What a node does after its start sequence
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AfterStart {
    ReceiveMessages,
    /// the node has no sources, so there is nothing to receive
    StopNode,
}

/// A node's reaction to a STOP from one of its sources
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StopResponse {
    /// all sources have stopped
    Stop,
    Ignore,
}

/// The hooks that [run_lifecycle] drives, in this order:
///
/// `on_start`, then (unless the start sequence says otherwise) one `on_receive_message` or
///  `on_receive_stop` per incoming header until a STOP is answered with [StopResponse::Stop],
///  then `on_stop`. Deferred callbacks run after the start sequence, after every DATA message
///  and after the stop sequence.
#[async_trait]
pub trait NodeLifecycle: Send {
    fn enter_state(&mut self, state: NodeState);

    async fn on_start(&mut self) -> anyhow::Result<AfterStart>;

    /// blocks until the next header arrives from any source
    async fn receive_header(&mut self) -> anyhow::Result<MessageHeader>;

    async fn on_receive_message(&mut self, header: MessageHeader) -> anyhow::Result<()>;

    async fn on_receive_stop(&mut self, header: MessageHeader) -> anyhow::Result<StopResponse>;

    async fn on_stop(&mut self) -> anyhow::Result<()>;

    /// runs and clears the deferred callbacks, most recently registered first
    fn run_deferred(&mut self);
}

pub async fn run_lifecycle<N: NodeLifecycle + ?Sized>(node: &mut N) -> anyhow::Result<()> {
    node.enter_state(NodeState::Started);
    let after_start = node.on_start().await?;
    node.run_deferred();

    match after_start {
        AfterStart::ReceiveMessages => {
            node.enter_state(NodeState::ReceivingMessages);
            loop {
                let header = node.receive_header().await?;
                match header.message_type {
                    MessageType::Stop => {
                        if node.on_receive_stop(header).await? == StopResponse::Stop {
                            debug!("all sources stopped");
                            break;
                        }
                    }
                    MessageType::Data => {
                        node.on_receive_message(header).await?;
                        node.run_deferred();
                    }
                }
            }
        }
        AfterStart::StopNode => {
            debug!("node has no sources - stopping right after start");
        }
    }

    node.enter_state(NodeState::Stopped);
    node.on_stop().await?;
    node.run_deferred();
    Ok(())
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::*;

    /// records the sequence of hook invocations, answering STOPs from a script
    struct ScriptedNode {
        after_start: AfterStart,
        incoming: VecDeque<MessageHeader>,
        stop_responses: VecDeque<StopResponse>,
        calls: Vec<String>,
    }

    impl ScriptedNode {
        fn new(after_start: AfterStart, incoming: Vec<MessageHeader>, stop_responses: Vec<StopResponse>) -> ScriptedNode {
            ScriptedNode {
                after_start,
                incoming: incoming.into(),
                stop_responses: stop_responses.into(),
                calls: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl NodeLifecycle for ScriptedNode {
        fn enter_state(&mut self, state: NodeState) {
            self.calls.push(format!("{:?}", state));
        }

        async fn on_start(&mut self) -> anyhow::Result<AfterStart> {
            self.calls.push("start".to_string());
            Ok(self.after_start)
        }

        async fn receive_header(&mut self) -> anyhow::Result<MessageHeader> {
            self.incoming.pop_front()
                .ok_or_else(|| anyhow::anyhow!("receiving after the last scripted header"))
        }

        async fn on_receive_message(&mut self, header: MessageHeader) -> anyhow::Result<()> {
            self.calls.push(format!("data {}", header.id));
            Ok(())
        }

        async fn on_receive_stop(&mut self, header: MessageHeader) -> anyhow::Result<StopResponse> {
            self.calls.push(format!("stop from {}", header.sender));
            self.stop_responses.pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted stop response"))
        }

        async fn on_stop(&mut self) -> anyhow::Result<()> {
            self.calls.push("stop".to_string());
            Ok(())
        }

        fn run_deferred(&mut self) {
            self.calls.push("deferred".to_string());
        }
    }

    #[tokio::test]
    async fn test_without_sources() {
        let mut node = ScriptedNode::new(AfterStart::StopNode, vec![], vec![]);
        run_lifecycle(&mut node).await.unwrap();
        assert_eq!(node.calls, vec!["Started", "start", "deferred", "Stopped", "stop", "deferred"]);
    }

    #[tokio::test]
    async fn test_receive_loop() {
        let mut node = ScriptedNode::new(
            AfterStart::ReceiveMessages,
            vec![
                MessageHeader::data(1, 0, 7),
                MessageHeader::stop(1, 0, 8),
                MessageHeader::data(2, 0, 3),
                MessageHeader::stop(2, 0, 4),
                MessageHeader::data(2, 0, 99),
            ],
            vec![StopResponse::Ignore, StopResponse::Stop],
        );
        run_lifecycle(&mut node).await.unwrap();

        assert_eq!(node.calls, vec![
            "Started", "start", "deferred",
            "ReceivingMessages",
            "data 7", "deferred",
            "stop from 1",
            "data 3", "deferred",
            "stop from 2",
            "Stopped", "stop", "deferred",
        ]);
        assert_eq!(node.incoming.len(), 1);
    }

    #[tokio::test]
    async fn test_receive_error_ends_lifecycle() {
        let mut node = ScriptedNode::new(AfterStart::ReceiveMessages, vec![MessageHeader::data(1, 0, 0)], vec![]);
        assert!(run_lifecycle(&mut node).await.is_err());
        assert!(!node.calls.contains(&"Stopped".to_string()));
    }
}
