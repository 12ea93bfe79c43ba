//! 仿真结束后的汇总报表

use serde::Serialize;

use lbsim_broker::BrokerHandle;

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub scenario: String,
    pub strategy: String,
    pub total_tasks: usize,
    pub completed: usize,
    pub quarantined: usize,
    /// 仿真截止时仍排队或在途的任务
    pub unfinished: usize,
    /// 最后一个任务的完成时刻（虚拟秒）
    pub makespan: f64,
    pub avg_response_time: f64,
    pub max_response_time: f64,
    pub brokers: Vec<BrokerSummary>,
}

#[derive(Debug, Serialize)]
pub struct BrokerSummary {
    pub name: String,
    pub region: String,
    pub completed: usize,
    pub quarantined: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub failed: bool,
    pub takeover_done: bool,
}

impl SummaryReport {
    pub fn collect(
        scenario: &str,
        strategy: &str,
        total_tasks: usize,
        brokers: &[BrokerHandle],
    ) -> Self {
        let mut completed = 0usize;
        let mut quarantined = 0usize;
        let mut unfinished = 0usize;
        let mut makespan = 0.0f64;
        let mut response_sum = 0.0f64;
        let mut response_max = 0.0f64;
        let mut summaries = Vec::with_capacity(brokers.len());

        for handle in brokers {
            let broker = handle.borrow();
            completed += broker.completed().len();
            quarantined += broker.queues().quarantine().len();
            unfinished += broker.queues().queued_len() + broker.in_flight().len();

            for task in broker.completed() {
                if let Some(finish) = task.finish_time {
                    makespan = makespan.max(finish);
                }
                if let Some(rt) = task.true_response_time() {
                    response_sum += rt;
                    response_max = response_max.max(rt);
                }
            }

            summaries.push(BrokerSummary {
                name: format!("LB{}", broker.lb_id()),
                region: broker.region().to_string(),
                completed: broker.completed().len(),
                quarantined: broker.queues().quarantine().len(),
                queued: broker.queues().queued_len(),
                in_flight: broker.in_flight().len(),
                failed: broker.is_failed(),
                takeover_done: broker.takeover_done(),
            });
        }

        let avg_response_time = if completed > 0 {
            response_sum / completed as f64
        } else {
            0.0
        };

        Self {
            scenario: scenario.to_string(),
            strategy: strategy.to_string(),
            total_tasks,
            completed,
            quarantined,
            unfinished,
            makespan,
            avg_response_time,
            max_response_time: response_max,
            brokers: summaries,
        }
    }
}
