//! Property-based tests for task selection and secret tracking.
//!
//! Tests validate:
//! - One renewal task per renewable secret, plus one for the auth secret
//! - The tracker keeps one record per name, holding the last fetch
//! - Rendering the same template twice gives identical output

mod common;

use common::{FakeRenewer, auth_secret, data, leased, static_secret};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vault_client::SecretData;
use vaultify::{
    LeaseIdentity, LeaseOrchestrator, MapSecretReader, NoopMetrics, SecretSnapshot,
    SecretTracker, TemplateRenderer,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn arb_secret_name() -> impl Strategy<Value = String> {
    "[a-z]{2,8}/[a-z]{2,8}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tasks_match_renewable_secrets(
        secrets in prop::collection::btree_map(arb_secret_name(), any::<bool>(), 0..12),
        with_auth in any::<bool>(),
    ) {
        let snapshot = SecretSnapshot {
            auth_secret: with_auth.then(auth_secret),
            secrets: secrets
                .iter()
                .map(|(name, renewable)| {
                    let secret = if *renewable { leased(name) } else { static_secret() };
                    (name.clone(), secret)
                })
                .collect(),
        };
        let renewable = secrets.values().filter(|r| **r).count();

        let (identities, watched) = runtime().block_on(async {
            let renewer = Arc::new(FakeRenewer::new());
            let shutdown = CancellationToken::new();
            let set = LeaseOrchestrator::new(renewer.clone(), Arc::new(NoopMetrics))
                .start(&snapshot, &shutdown);
            let identities = set.identities().to_vec();
            shutdown.cancel();
            assert!(set.wait().await.is_ok());
            (identities, renewer.watched())
        });

        prop_assert_eq!(identities.len(), renewable + usize::from(with_auth));
        prop_assert_eq!(watched, identities.len());
        prop_assert_eq!(identities.first() == Some(&LeaseIdentity::Auth), with_auth);
        for identity in &identities {
            if let LeaseIdentity::Secret(name) = identity {
                prop_assert!(secrets[name]);
            }
        }
    }

    #[test]
    fn prop_tracker_keeps_one_record_per_name(
        lookups in prop::collection::vec(0usize..5, 1..30),
    ) {
        let names: Vec<String> = (0..5).map(|i| format!("secret/{i}")).collect();
        let reader = names
            .iter()
            .map(|name| (name.clone(), data(json!({ "name": name }))))
            .collect::<MapSecretReader>();
        let tracker = SecretTracker::new(Arc::new(reader));

        runtime().block_on(async {
            for index in &lookups {
                tracker.get(&names[*index]).await.unwrap();
            }
        });

        let snapshot = tracker.into_snapshot();
        let expected: BTreeMap<_, _> = lookups.iter().map(|i| (names[*i].as_str(), ())).collect();
        prop_assert_eq!(snapshot.names().collect::<Vec<_>>(), expected.keys().copied().collect::<Vec<_>>());
        for (name, secret) in &snapshot.secrets {
            prop_assert_eq!(&secret.data["name"], &json!(name));
        }
    }

    #[test]
    fn prop_rendering_is_deterministic(
        value in "[A-Za-z0-9 ]{0,32}",
        key in "k[a-z]{0,7}",
    ) {
        let template = format!(
            r#"{{% set s = vault("secret/app") %}}{{{{ s.data.{key} | quote }}}}:{{{{ s.data.{key} | b64enc }}}}"#
        );
        let render = || {
            let mut secret = SecretData::new();
            secret.insert(key.clone(), json!(value.clone()));
            let reader = MapSecretReader::default().with_secret("secret/app", secret);
            let renderer = TemplateRenderer::new(Arc::new(reader));
            runtime().block_on(async {
                let out = renderer.render_str("prop", &template).await.unwrap();
                (out, renderer.snapshot())
            })
        };

        let (first, first_snapshot) = render();
        let (second, second_snapshot) = render();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first_snapshot, second_snapshot);
        prop_assert!(first.starts_with('"'));
    }
}
