//! Worker Module Tests
//!
//! Covers the local pieces (store, function registry) and the served
//! operations of a running worker, compute included.
//!
//! ## Test Scopes
//! - **Registry**: Function registration, lookup, and failure surfaces.
//! - **Store**: Local key -> value mechanics.
//! - **Service**: Data-plane RPCs and the compute pipeline, including
//!   peer dependency fetches driven by center lookups.

#[cfg(test)]
mod tests {
    use crate::center::protocol::{CenterOp, CenterReply, Key};
    use crate::center::service::Center;
    use crate::rpc::client::send_recv;
    use crate::worker::protocol::{TaskArg, WorkerOp, WorkerReply};
    use crate::worker::registry::FunctionRegistry;
    use crate::worker::service::Worker;
    use crate::worker::store::DataStore;
    use anyhow::Result;
    use serde_json::{Value, json};
    use std::collections::{HashMap, HashSet};
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn int_add(args: &[Value], _kwargs: &HashMap<String, Value>) -> Result<Value> {
        let mut total = 0i64;
        for value in args {
            total += value
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("Not an integer: {}", value))?;
        }
        Ok(json!(total))
    }

    async fn spawn_center() -> Arc<Center> {
        let center = Center::new("127.0.0.1:0".parse().unwrap()).await.unwrap();
        center.clone().start().await.unwrap();
        center
    }

    async fn spawn_worker(center: SocketAddr, registry: Arc<FunctionRegistry>) -> Arc<Worker> {
        let worker = Worker::new("127.0.0.1:0".parse().unwrap(), center, 2, registry)
            .await
            .unwrap();
        worker.clone().start().await.unwrap();
        worker
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[test]
    fn test_registry_register_and_call() {
        // ARRANGE
        let registry = FunctionRegistry::new();
        registry.register("add", int_add);

        // ASSERT: registered and callable
        assert!(registry.has_function("add"));
        assert_eq!(registry.function_count(), 1);

        let result = registry
            .call("add", &[json!(1), json!(2)], &HashMap::new())
            .unwrap();
        assert_eq!(result, json!(3));
    }

    #[test]
    fn test_registry_unknown_function_returns_error() {
        let registry = FunctionRegistry::new();

        let result = registry.call("nope", &[], &HashMap::new());

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unknown compute function")
        );
    }

    #[test]
    fn test_registry_function_can_fail() {
        let registry = FunctionRegistry::new();
        registry.register("broken", |_args, _kwargs| {
            Err(anyhow::anyhow!("Intentional error"))
        });

        let result = registry.call("broken", &[], &HashMap::new());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Intentional error"));
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[test]
    fn test_store_insert_get_remove() {
        let store = DataStore::new();
        assert!(store.is_empty());

        store.insert(Key::from("x"), json!(42));
        assert!(store.contains(&Key::from("x")));
        assert_eq!(store.get(&Key::from("x")), Some(json!(42)));
        assert_eq!(store.len(), 1);

        store.remove(&Key::from("x"));
        assert!(!store.contains(&Key::from("x")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_get_many_skips_missing() {
        let store = DataStore::new();
        store.insert(Key::from("x"), json!("hello"));

        let entries = store.get_many(&[Key::from("x"), Key::from("ghost")]);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[&Key::from("x")], json!("hello"));
    }

    // ============================================================
    // SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_worker_registers_on_start() {
        // ARRANGE
        let center = spawn_center().await;

        // ACT
        let worker = spawn_worker(center.address(), FunctionRegistry::new()).await;

        // ASSERT: the center already knows the worker and its cores
        let reply: CenterReply = send_recv(center.address(), CenterOp::Ncores { addresses: None })
            .await
            .unwrap();
        let cores = match reply {
            CenterReply::Ncores { cores } => cores,
            other => panic!("Unexpected reply: {:?}", other),
        };
        assert_eq!(cores.get(&worker.address()), Some(&2));
    }

    #[tokio::test]
    async fn test_data_plane_round_trip() {
        // ARRANGE
        let center = spawn_center().await;
        let worker = spawn_worker(center.address(), FunctionRegistry::new()).await;

        // ACT: store two values over the wire
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::UpdateData {
                data: HashMap::from([
                    (Key::from("a"), json!(1)),
                    (Key::from("b"), json!(2)),
                ]),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT: get-data answers only what exists
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::GetData {
                keys: vec![Key::from("a"), Key::from("b"), Key::from("ghost")],
            },
        )
        .await
        .unwrap();
        let entries = match reply {
            WorkerReply::Data { entries } => entries,
            other => panic!("Unexpected reply: {:?}", other),
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[&Key::from("a")], json!(1));
        assert_eq!(entries[&Key::from("b")], json!(2));

        // ACT: drop one key
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::DelData {
                keys: vec![Key::from("a")],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT
        assert!(!worker.store.contains(&Key::from("a")));
        assert!(worker.store.contains(&Key::from("b")));
    }

    #[tokio::test]
    async fn test_compute_stores_and_advertises_result() {
        // ARRANGE
        let center = spawn_center().await;
        let registry = FunctionRegistry::new();
        registry.register("add", int_add);
        let worker = spawn_worker(center.address(), registry).await;

        // ACT: compute over two literals
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::Compute {
                function: "add".to_string(),
                key: Key::from("sum"),
                args: vec![TaskArg::literal(1), TaskArg::literal(2)],
                kwargs: HashMap::new(),
                needed: vec![],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT: the result is stored locally
        assert_eq!(worker.store.get(&Key::from("sum")), Some(json!(3)));

        // ASSERT: the ack implies the center already tracks the key
        let reply: CenterReply = send_recv(
            center.address(),
            CenterOp::WhoHas {
                keys: Some(vec![Key::from("sum")]),
            },
        )
        .await
        .unwrap();
        let holders = match reply {
            CenterReply::WhoHas { holders } => holders,
            other => panic!("Unexpected reply: {:?}", other),
        };
        assert_eq!(holders[&Key::from("sum")], HashSet::from([worker.address()]));
    }

    #[tokio::test]
    async fn test_compute_fetches_dependencies_from_peers() {
        // ARRANGE: x lives on worker a, the computation runs on worker b
        let center = spawn_center().await;
        let worker_a = spawn_worker(center.address(), FunctionRegistry::new()).await;

        let registry_b = FunctionRegistry::new();
        registry_b.register("add", int_add);
        let worker_b = spawn_worker(center.address(), registry_b).await;

        let reply: WorkerReply = send_recv(
            worker_a.address(),
            WorkerOp::UpdateData {
                data: HashMap::from([(Key::from("x"), json!(5))]),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        let reply: CenterReply = send_recv(
            center.address(),
            CenterOp::AddKeys {
                address: worker_a.address(),
                keys: vec![Key::from("x")],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, CenterReply::Ok);

        // ACT: worker b needs x and must fetch it from worker a
        let reply: WorkerReply = send_recv(
            worker_b.address(),
            WorkerOp::Compute {
                function: "add".to_string(),
                key: Key::from("result"),
                args: vec![TaskArg::reference("x"), TaskArg::literal(10)],
                kwargs: HashMap::new(),
                needed: vec![Key::from("x")],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT: result stored on b, the fetched dependency was not kept
        assert_eq!(worker_b.store.get(&Key::from("result")), Some(json!(15)));
        assert!(!worker_b.store.contains(&Key::from("x")));
    }

    #[tokio::test]
    async fn test_compute_unknown_function_is_an_error_reply() {
        let center = spawn_center().await;
        let worker = spawn_worker(center.address(), FunctionRegistry::new()).await;

        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::Compute {
                function: "nope".to_string(),
                key: Key::from("out"),
                args: vec![],
                kwargs: HashMap::new(),
                needed: vec![],
            },
        )
        .await
        .unwrap();

        match reply {
            WorkerReply::Error { message } => {
                assert!(message.contains("Unknown compute function"), "got: {}", message);
            }
            other => panic!("Expected an error reply, got: {:?}", other),
        }
        assert!(!worker.store.contains(&Key::from("out")));
    }

    #[tokio::test]
    async fn test_compute_missing_holder_is_an_error_reply() {
        // ARRANGE: nobody holds the needed key
        let center = spawn_center().await;
        let registry = FunctionRegistry::new();
        registry.register("add", int_add);
        let worker = spawn_worker(center.address(), registry).await;

        // ACT
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::Compute {
                function: "add".to_string(),
                key: Key::from("out"),
                args: vec![TaskArg::reference("ghost")],
                kwargs: HashMap::new(),
                needed: vec![Key::from("ghost")],
            },
        )
        .await
        .unwrap();

        // ASSERT
        match reply {
            WorkerReply::Error { message } => {
                assert!(message.contains("No holder known"), "got: {}", message);
            }
            other => panic!("Expected an error reply, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_literal_that_looks_like_a_key_stays_literal() {
        // ARRANGE: the store holds a value under "k1", and the argument is
        // the plain string "k1"
        let center = spawn_center().await;
        let registry = FunctionRegistry::new();
        registry.register("first", |args, _kwargs| {
            args.first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("No arguments"))
        });
        let worker = spawn_worker(center.address(), registry).await;

        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::UpdateData {
                data: HashMap::from([(Key::from("k1"), json!(99))]),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ACT
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::Compute {
                function: "first".to_string(),
                key: Key::from("out"),
                args: vec![TaskArg::literal("k1")],
                kwargs: HashMap::new(),
                needed: vec![],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT: the literal was passed through, not dereferenced
        assert_eq!(worker.store.get(&Key::from("out")), Some(json!("k1")));
    }

    #[tokio::test]
    async fn test_compute_resolves_kwargs_against_local_store() {
        // ARRANGE: the factor is already local, so no peer fetch happens
        let center = spawn_center().await;
        let registry = FunctionRegistry::new();
        registry.register("scale", |args, kwargs| {
            let base = args[0].as_i64().unwrap_or(0);
            let factor = kwargs
                .get("factor")
                .and_then(|value| value.as_i64())
                .ok_or_else(|| anyhow::anyhow!("Missing factor"))?;
            Ok(json!(base * factor))
        });
        let worker = spawn_worker(center.address(), registry).await;

        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::UpdateData {
                data: HashMap::from([(Key::from("f"), json!(3))]),
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ACT
        let reply: WorkerReply = send_recv(
            worker.address(),
            WorkerOp::Compute {
                function: "scale".to_string(),
                key: Key::from("scaled"),
                args: vec![TaskArg::literal(5)],
                kwargs: HashMap::from([("factor".to_string(), TaskArg::reference("f"))]),
                needed: vec![Key::from("f")],
            },
        )
        .await
        .unwrap();
        assert_eq!(reply, WorkerReply::Ok);

        // ASSERT
        assert_eq!(worker.store.get(&Key::from("scaled")), Some(json!(15)));
    }
}
