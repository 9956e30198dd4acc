use crate::error::Result;
use crate::executor::{HostContext, Task, TaskValue};
use crate::topology::Topology;

pub fn show() -> Task {
    Task::new("topology show", show_topology)
        .summary("Show the current topology configuration for the cluster")
        .local()
}

async fn show_topology(cx: HostContext, _args: Vec<String>) -> Result<TaskValue> {
    let topology = Topology::load(&cx.settings().topology_path())?;
    let yaml = topology.to_yaml()?;
    println!("{}", yaml.trim_end());
    Ok(TaskValue::Text(yaml))
}
