//! Command semantics against an in-process server context: no sockets,
//! real stores, real WAL.

use kvdb::config::{ClusterConfig, KvdbConfig, ServerConfig};
use kvdb::protocol::{codec, Command, Message, Response};
use kvdb::session::ResponseSink;
use kvdb::ServerContext;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> ServerConfig {
    let kvdb = KvdbConfig {
        dbs_rootdir: dir.path().join("dbs"),
        dbs_partitions: 2,
        ..KvdbConfig::default()
    };
    ServerConfig::standalone(dir.path(), kvdb)
}

fn test_ctx() -> (TempDir, ServerContext) {
    let dir = TempDir::new().unwrap();
    let ctx = ServerContext::open(test_config(&dir)).unwrap();
    ctx.create_database("test1").unwrap();
    (dir, ctx)
}

fn call(ctx: &ServerContext, session: &str, command: Command) -> Response {
    let reply = ctx.execute(session, &Message::request(17, command));
    assert_eq!(reply.id, 17, "responses echo the request id");
    reply.as_response().unwrap().clone()
}

fn b(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

// =============================================================================
// use / create_db
// =============================================================================

#[test]
fn use_unknown_db_fails_until_created() {
    let (_dir, ctx) = test_ctx();

    let response = call(&ctx, "s", Command::use_db("db0"));
    assert!(!response.is_success());

    assert!(call(&ctx, "s", Command::create_db("db0")).is_success());
    assert!(call(&ctx, "s", Command::use_db("db0")).is_success());
}

#[test]
fn create_db_rejects_duplicates_and_bad_names() {
    let (_dir, ctx) = test_ctx();

    let response = call(&ctx, "s", Command::create_db("test1"));
    assert!(!response.is_success());
    assert!(response.message.contains("exists"));

    assert!(!call(&ctx, "s", Command::create_db("../evil")).is_success());
    assert!(!call(&ctx, "s", Command::create_db("")).is_success());
}

#[test]
fn create_db_is_visible_to_other_sessions() {
    let (_dir, ctx) = test_ctx();
    assert!(call(&ctx, "a", Command::create_db("shared")).is_success());
    assert!(call(&ctx, "b", Command::use_db("shared")).is_success());
}

// =============================================================================
// get / exists / put
// =============================================================================

#[test]
fn get_and_exists_with_no_keys_return_empty() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    let response = call(&ctx, "s", Command::get(vec![]));
    assert!(response.is_success());
    assert!(response.result.is_empty());

    let response = call(&ctx, "s", Command::exists(vec![]));
    assert!(response.is_success());
    assert!(response.result.is_empty());
}

#[test]
fn get_and_exists_on_missing_keys() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    let response = call(&ctx, "s", Command::get(vec![b("k1"), b("k2")]));
    assert_eq!(response.result, vec![None, None]);

    let response = call(&ctx, "s", Command::exists(vec![b("k1"), b("k2")]));
    assert_eq!(response.result, vec![Some(vec![0]), Some(vec![0])]);
}

#[test]
fn put_requires_pairs() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    let response = call(&ctx, "s", Command::put(vec![b("k")]));
    assert!(!response.is_success());

    // Zero pairs is paired; nothing to write.
    assert!(call(&ctx, "s", Command::put(vec![])).is_success());
}

#[test]
fn put_then_read_back() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    assert!(call(&ctx, "s", Command::put(vec![b("k"), b("v")])).is_success());

    let response = call(&ctx, "s", Command::get(vec![b("k")]));
    assert_eq!(response.result, vec![Some(b("v"))]);

    let response = call(&ctx, "s", Command::exists(vec![b("k")]));
    assert_eq!(response.result, vec![Some(vec![1])]);

    assert!(call(
        &ctx,
        "s",
        Command::put(vec![b("k1"), b("v1"), b("k2"), b("v2")])
    )
    .is_success());
    let response = call(&ctx, "s", Command::get(vec![b("k1"), b("k2")]));
    assert_eq!(response.result, vec![Some(b("v1")), Some(b("v2"))]);
}

#[test]
fn commands_require_a_bound_database() {
    let (_dir, ctx) = test_ctx();

    assert!(!call(&ctx, "s", Command::get(vec![b("k")])).is_success());
    assert!(!call(&ctx, "s", Command::put(vec![b("k"), b("v")])).is_success());
    assert!(!call(&ctx, "s", Command::batch_begin()).is_success());
}

// =============================================================================
// Batches
// =============================================================================

#[test]
fn batch_is_buffered_and_isolated_until_commit() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "a", Command::use_db("test1"));
    call(&ctx, "b", Command::use_db("test1"));

    assert!(call(&ctx, "a", Command::batch_begin()).is_success());
    assert!(call(&ctx, "a", Command::put(vec![b("k1"), b("v1")])).is_success());

    // Read-your-own-writes inside the batching session.
    let response = call(&ctx, "a", Command::get(vec![b("k1")]));
    assert_eq!(response.result, vec![Some(b("v1"))]);
    let response = call(&ctx, "a", Command::exists(vec![b("k1")]));
    assert_eq!(response.result, vec![Some(vec![1])]);

    // Invisible to everyone else.
    let response = call(&ctx, "b", Command::get(vec![b("k1")]));
    assert_eq!(response.result, vec![None]);

    assert!(call(&ctx, "a", Command::batch_commit(None)).is_success());

    let response = call(&ctx, "b", Command::get(vec![b("k1")]));
    assert_eq!(response.result, vec![Some(b("v1"))]);
}

#[test]
fn batch_commit_without_begin_fails() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    let response = call(&ctx, "s", Command::batch_commit(None));
    assert!(!response.is_success());

    assert!(call(&ctx, "s", Command::batch_begin()).is_success());
    assert!(call(&ctx, "s", Command::batch_commit(None)).is_success());

    // The commit left batch mode.
    let session = ctx.session("s", ResponseSink::detached());
    assert!(!session.batch_mode());
}

#[test]
fn batch_size_mismatch_keeps_the_batch_open() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    call(&ctx, "s", Command::batch_begin());
    call(&ctx, "s", Command::put(vec![b("a"), b("1"), b("b"), b("2")]));

    let response = call(&ctx, "s", Command::batch_commit(Some(1)));
    assert!(!response.is_success());
    assert!(response.message.contains("size not match"));

    // Still batching; the right count commits.
    let session = ctx.session("s", ResponseSink::detached());
    assert!(session.batch_mode());
    assert!(call(&ctx, "s", Command::batch_commit(Some(2))).is_success());

    let response = call(&ctx, "s", Command::get(vec![b("a"), b("b")]));
    assert_eq!(response.result, vec![Some(b("1")), Some(b("2"))]);
}

#[test]
fn batch_begin_is_idempotent_and_clears_the_buffer() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    call(&ctx, "s", Command::batch_begin());
    call(&ctx, "s", Command::put(vec![b("k"), b("v")]));
    call(&ctx, "s", Command::batch_begin());
    assert!(call(&ctx, "s", Command::batch_commit(Some(0))).is_success());

    let response = call(&ctx, "s", Command::get(vec![b("k")]));
    assert_eq!(response.result, vec![None]);
}

#[test]
fn batch_abort_discards_the_buffer() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    // Abort outside a batch is a harmless no-op.
    assert!(call(&ctx, "s", Command::batch_abort()).is_success());

    call(&ctx, "s", Command::batch_begin());
    call(&ctx, "s", Command::put(vec![b("k"), b("v")]));
    assert!(call(&ctx, "s", Command::batch_abort()).is_success());

    let session = ctx.session("s", ResponseSink::detached());
    assert!(!session.batch_mode());
    let response = call(&ctx, "s", Command::get(vec![b("k")]));
    assert_eq!(response.result, vec![None]);
}

#[test]
fn duplicate_keys_in_a_batch_last_write_wins() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));

    call(&ctx, "s", Command::batch_begin());
    call(&ctx, "s", Command::put(vec![b("k"), b("first")]));
    call(&ctx, "s", Command::put(vec![b("k"), b("second")]));

    // One key buffered, not two.
    assert!(call(&ctx, "s", Command::batch_commit(Some(1))).is_success());
    let response = call(&ctx, "s", Command::get(vec![b("k")]));
    assert_eq!(response.result, vec![Some(b("second"))]);
}

#[test]
fn rebinding_aborts_an_active_batch() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::use_db("test1"));
    call(&ctx, "s", Command::batch_begin());
    call(&ctx, "s", Command::put(vec![b("k"), b("v")]));

    call(&ctx, "s", Command::use_db("test1"));
    let session = ctx.session("s", ResponseSink::detached());
    assert!(!session.batch_mode());
    let response = call(&ctx, "s", Command::get(vec![b("k")]));
    assert_eq!(response.result, vec![None]);
}

// =============================================================================
// Admin commands
// =============================================================================

#[test]
fn show_dbs_lists_enabled_databases() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::create_db("another"));

    let response = call(&ctx, "s", Command::show_dbs());
    assert!(response.is_success());
    let names: Vec<String> = response
        .result
        .iter()
        .map(|e| String::from_utf8(e.clone().unwrap()).unwrap())
        .collect();
    assert_eq!(names, vec!["another".to_string(), "test1".to_string()]);
}

#[test]
fn disable_and_enable_cycle() {
    let (_dir, ctx) = test_ctx();
    call(&ctx, "s", Command::create_db("cycle"));

    assert!(call(&ctx, "s", Command::disable_db("cycle")).is_success());
    assert!(!call(&ctx, "s", Command::use_db("cycle")).is_success());
    let response = call(&ctx, "s", Command::show_dbs());
    assert_eq!(response.result.len(), 1);

    assert!(call(&ctx, "s", Command::enable_db("cycle")).is_success());
    assert!(call(&ctx, "s", Command::use_db("cycle")).is_success());

    // Both directions are idempotent.
    assert!(call(&ctx, "s", Command::enable_db("cycle")).is_success());
    assert!(!call(&ctx, "s", Command::disable_db("missing")).is_success());
}

// =============================================================================
// cluster_info / unknown commands
// =============================================================================

#[test]
fn cluster_info_reports_clustered_databases_only() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.cluster = ClusterConfig::from_map(
        [
            ("quorum".to_string(), vec!["h1:7078".to_string(), "h2:7078".to_string()]),
            ("solo".to_string(), vec!["h1:7078".to_string()]),
        ]
        .into_iter()
        .collect(),
    );
    let ctx = ServerContext::open(config).unwrap();

    let response = call(&ctx, "s", Command::cluster_info());
    assert!(response.is_success());
    let blob = response.result[0].as_ref().unwrap();
    let descriptor = codec::decode_cluster_info(blob).unwrap();

    assert_eq!(descriptor.len(), 1);
    assert_eq!(
        descriptor["quorum"],
        vec!["h1:7078".to_string(), "h2:7078".to_string()]
    );
}

#[test]
fn unknown_command_is_an_error_response() {
    let (_dir, ctx) = test_ctx();
    let message = Message::request(
        99,
        Command { name: "compact".to_string(), params: vec![] },
    );
    let reply = ctx.execute("s", &message);
    assert_eq!(reply.id, 99);
    let response = reply.as_response().unwrap();
    assert!(!response.is_success());
    assert!(response.message.contains("unknown command"));
}

// =============================================================================
// Durability across restart
// =============================================================================

#[test]
fn committed_writes_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    {
        let ctx = ServerContext::open(test_config(&dir)).unwrap();
        ctx.create_database("test1").unwrap();
        call(&ctx, "s", Command::use_db("test1"));
        call(&ctx, "s", Command::put(vec![b("stay"), b("here")]));

        // An uncommitted batch dies with the process.
        call(&ctx, "s", Command::batch_begin());
        call(&ctx, "s", Command::put(vec![b("ghost"), b("gone")]));
    }

    // The dblist was persisted by create_db, so a plain reload finds it.
    let reloaded = {
        let kvdb = KvdbConfig {
            dbs_rootdir: dir.path().join("dbs"),
            dbs_partitions: 2,
            ..KvdbConfig::default()
        };
        let dblist = kvdb::config::DbList::load(
            &dir.path().join("system").join("dblist"),
            &kvdb,
        )
        .unwrap();
        ServerConfig { kvdb, dblist, cluster: ClusterConfig::default() }
    };
    let ctx = ServerContext::open(reloaded).unwrap();
    call(&ctx, "s", Command::use_db("test1"));

    let response = call(&ctx, "s", Command::get(vec![b("stay"), b("ghost")]));
    assert_eq!(response.result, vec![Some(b("here")), None]);
}
