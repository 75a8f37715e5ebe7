use cwagent_operator::crd::AmazonCloudWatchAgent;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&AmazonCloudWatchAgent::crd())?);
    Ok(())
}
