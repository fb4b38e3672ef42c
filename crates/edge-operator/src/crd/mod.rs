mod edge_deployment;

pub use edge_deployment::{
    CreateOptions, EdgeDeployment, EdgeDeploymentSpec, EnvValue, HostConfig, ModuleConfig,
    ModuleCredentials, ModuleEntry, ModuleIdentity, MountSpec, PortBinding, RegistryAuth,
};

use kube::CustomResourceExt;

pub fn print_crds() {
    println!("---");
    println!("{}", serde_yaml::to_string(&EdgeDeployment::crd()).unwrap());
}
