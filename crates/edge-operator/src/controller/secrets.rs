use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::constants;
use crate::crd::{ModuleEntry, RegistryAuth};
use crate::error::Result;

/// Secret name derived from the credential content, so the same credential
/// used by several modules collapses into one secret.
pub fn pull_secret_name(auth: &RegistryAuth) -> String {
    format!(
        "{}-{}",
        auth.username.to_lowercase(),
        auth.serveraddress.to_lowercase()
    )
}

/// Project one registry credential into a dockerconfigjson Secret.
pub fn pull_secret(auth: &RegistryAuth) -> Result<Secret> {
    let docker_config = serde_json::json!({
        "auths": {
            &auth.serveraddress: {
                "username": auth.username,
                "password": auth.password,
                "auth": BASE64.encode(format!("{}:{}", auth.username, auth.password)),
            }
        }
    });
    let data = serde_json::to_vec(&docker_config)?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(pull_secret_name(auth)),
            namespace: Some(constants::PULL_SECRET_NAMESPACE.to_string()),
            ..Default::default()
        },
        type_: Some(constants::PULL_SECRET_TYPE.to_string()),
        data: Some(
            [(constants::PULL_SECRET_DATA.to_string(), ByteString(data))]
                .into_iter()
                .collect(),
        ),
        ..Default::default()
    })
}

/// All pull secrets for a module set, keyed by name. Duplicate credentials
/// collapse onto one entry.
pub fn pull_secrets(modules: &[ModuleEntry]) -> Result<BTreeMap<String, Secret>> {
    let mut secrets = BTreeMap::new();
    for entry in modules {
        if let Some(auth) = &entry.module.auth {
            secrets.insert(pull_secret_name(auth), pull_secret(auth)?);
        }
    }
    Ok(secrets)
}

/// Converge each secret: create when absent, replace when the stored
/// dockerconfigjson differs, leave alone otherwise.
pub async fn reconcile_pull_secrets(
    client: &Client,
    secrets: &BTreeMap<String, Secret>,
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client.clone(), constants::PULL_SECRET_NAMESPACE);

    for (name, secret) in secrets {
        match api.get(name).await {
            Ok(existing) => {
                if secret_data(&existing) == secret_data(secret) {
                    debug!(secret = %name, "image pull secret unchanged");
                    continue;
                }
                let mut replacement = secret.clone();
                replacement.metadata.resource_version = existing.metadata.resource_version.clone();
                api.replace(name, &PostParams::default(), &replacement)
                    .await?;
                info!(secret = %name, "replaced image pull secret");
            }
            Err(kube::Error::Api(response)) if response.code == 404 => {
                api.create(&PostParams::default(), secret).await?;
                info!(secret = %name, "created image pull secret");
            }
            Err(err) => {
                warn!(secret = %name, error = %err, "failed to read image pull secret");
                return Err(err.into());
            }
        }
    }
    Ok(())
}

fn secret_data(secret: &Secret) -> Option<&ByteString> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(constants::PULL_SECRET_DATA))
}
