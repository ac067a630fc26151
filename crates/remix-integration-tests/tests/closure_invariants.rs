//! Integration test: closure invariants under random edit sequences.
//!
//! Drives the engine with seeded random uploads, re-uploads (including
//! cycle-closing parents) and project removals, and after every step checks:
//! 1. Every live project has exactly one self-relation
//! 2. Every declared native parent is held once, as a direct forward
//!    edge or as a backward edge
//! 3. The forward closure equals breadth-first reachability over the direct
//!    forward edges, with the shortest depth
//! 4. A project is a remix root exactly when it has no forward ancestor
//!
//! Uses: remix-types, remix-db, remix-graph, rand

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use remix_graph::{NotifyError, RemixConfig, RemixManager, RemixNotifier, RemixService};
use remix_types::notification::RemixNotification;
use remix_types::project::{ParentDescriptor, Project};
use remix_types::ProjectId;

const PROJECTS: i64 = 12;
const STEPS: usize = 80;

// -----------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------

struct Discard;

impl RemixNotifier for Discard {
    fn notify_remix(&self, _notification: &RemixNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

fn new_service() -> RemixService {
    let conn = remix_db::open_memory().expect("open db");
    RemixService::new(conn, RemixManager::new(RemixConfig::default(), Arc::new(Discard)))
}

fn upload(id: ProjectId) -> Project {
    Project {
        id,
        name: format!("p{id}"),
        user_id: Some(id),
        username: None,
        version: 1,
    }
}

/// Declared parents of every live project, as the uploads stated them.
#[derive(Default)]
struct Model {
    declared: BTreeMap<ProjectId, BTreeSet<ProjectId>>,
}

impl Model {
    fn live(&self) -> Vec<ProjectId> {
        self.declared.keys().copied().collect()
    }

    /// Record an upload; parents that are not live are ignored by the engine.
    fn declare(&mut self, id: ProjectId, parents: &[ProjectId]) {
        let kept = parents
            .iter()
            .copied()
            .filter(|p| *p != id && self.declared.contains_key(p))
            .collect();
        self.declared.insert(id, kept);
    }

    fn remove(&mut self, id: ProjectId) {
        self.declared.remove(&id);
        for parents in self.declared.values_mut() {
            parents.remove(&id);
        }
    }
}

/// Random parent list drawn from `pool`, with an occasional dangling id.
fn random_parents(rng: &mut StdRng, pool: &[ProjectId]) -> Vec<ProjectId> {
    let mut parents: Vec<ProjectId> = pool
        .iter()
        .copied()
        .filter(|_| rng.gen_bool(0.25))
        .collect();
    if rng.gen_bool(0.1) {
        parents.push(PROJECTS + 100);
    }
    parents
}

fn forward_rows(conn: &Connection) -> BTreeMap<(ProjectId, ProjectId), u32> {
    let mut stmt = conn
        .prepare("SELECT ancestor_id, descendant_id, depth FROM forward_relations")
        .expect("prepare");
    stmt.query_map([], |row| Ok(((row.get(0)?, row.get(1)?), row.get(2)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

fn backward_rows(conn: &Connection) -> BTreeSet<(ProjectId, ProjectId)> {
    let mut stmt = conn
        .prepare("SELECT parent_id, child_id FROM backward_relations")
        .expect("prepare");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

fn root_flags(conn: &Connection) -> BTreeMap<ProjectId, bool> {
    let mut stmt = conn.prepare("SELECT id, remix_root FROM projects").expect("prepare");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

/// Shortest depth from `start` to every node reachable through `children`.
fn bfs(start: ProjectId, children: &BTreeMap<ProjectId, Vec<ProjectId>>) -> BTreeMap<ProjectId, u32> {
    let mut depth = BTreeMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let next = depth[&node] + 1;
        for &child in children.get(&node).into_iter().flatten() {
            if !depth.contains_key(&child) {
                depth.insert(child, next);
                queue.push_back(child);
            }
        }
    }
    depth
}

fn check(conn: &Connection, model: &Model, step: &str) {
    let forward = forward_rows(conn);
    let backward = backward_rows(conn);
    let live = model.live();

    // 1. live projects and self-relations
    let roots = root_flags(conn);
    assert_eq!(roots.keys().copied().collect::<Vec<_>>(), live, "{step}: live set");
    for &id in &live {
        assert_eq!(forward.get(&(id, id)), Some(&0), "{step}: self-relation of {id}");
    }

    // 2. declared parents are held exactly once
    let direct: BTreeSet<(ProjectId, ProjectId)> = forward
        .iter()
        .filter(|&(_, &depth)| depth == 1)
        .map(|(&key, _)| key)
        .collect();
    for (&child, declared) in &model.declared {
        let held_forward: BTreeSet<ProjectId> =
            direct.iter().filter(|(_, c)| *c == child).map(|(p, _)| *p).collect();
        let held_backward: BTreeSet<ProjectId> =
            backward.iter().filter(|(_, c)| *c == child).map(|(p, _)| *p).collect();
        assert!(
            held_forward.is_disjoint(&held_backward),
            "{step}: parent of {child} held twice"
        );
        let held: BTreeSet<ProjectId> = held_forward.union(&held_backward).copied().collect();
        assert_eq!(&held, declared, "{step}: parents of {child}");
    }

    // 3. closure is shortest-path reachability over direct forward edges
    let mut children: BTreeMap<ProjectId, Vec<ProjectId>> = BTreeMap::new();
    for &(parent, child) in &direct {
        children.entry(parent).or_default().push(child);
    }
    let mut expected = BTreeMap::new();
    for &id in &live {
        for (descendant, depth) in bfs(id, &children) {
            expected.insert((id, descendant), depth);
        }
    }
    assert_eq!(forward, expected, "{step}: closure");

    // 4. root flags
    for &id in &live {
        let has_ancestor = forward.keys().any(|&(a, d)| d == id && a != id);
        assert_eq!(roots[&id], !has_ancestor, "{step}: root flag of {id}");
    }
}

fn run_sequence(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut service = new_service();
    let mut model = Model::default();

    for step in 0..STEPS {
        let live = model.live();
        let action = rng.gen_range(0..10);
        let label;

        if live.is_empty() || action < 4 {
            let id = rng.gen_range(1..=PROJECTS);
            if model.declared.contains_key(&id) {
                continue;
            }
            let parents = random_parents(&mut rng, &live);
            service
                .on_project_created(
                    &upload(id),
                    &parents.iter().copied().map(ParentDescriptor::native).collect::<Vec<_>>(),
                )
                .expect("upload");
            model.declare(id, &parents);
            label = format!("seed {seed} step {step}: upload {id} with {parents:?}");
        } else if action < 9 {
            let id = live[rng.gen_range(0..live.len())];
            // Any live project may be declared, so cycles come up often.
            let mut parents = random_parents(&mut rng, &live);
            if rng.gen_bool(0.2) {
                parents.push(id);
            }
            service
                .on_project_parents_changed(
                    id,
                    &parents.iter().copied().map(ParentDescriptor::native).collect::<Vec<_>>(),
                )
                .expect("re-upload");
            model.declare(id, &parents);
            label = format!("seed {seed} step {step}: re-upload {id} with {parents:?}");
        } else {
            let id = live[rng.gen_range(0..live.len())];
            service.remove_project(id).expect("remove");
            model.remove(id);
            label = format!("seed {seed} step {step}: remove {id}");
        }

        check(service.connection(), &model, &label);
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[test]
fn random_edit_sequences_keep_closure_consistent() {
    for seed in 0..8 {
        run_sequence(seed);
    }
}

#[test]
fn full_graph_covers_every_connected_project() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut service = new_service();
    let mut model = Model::default();

    for id in 1..=PROJECTS {
        let parents = random_parents(&mut rng, &model.live());
        service
            .on_project_created(
                &upload(id),
                &parents.iter().copied().map(ParentDescriptor::native).collect::<Vec<_>>(),
            )
            .expect("upload");
        model.declare(id, &parents);
    }
    check(service.connection(), &model, "seeded uploads");

    // Undirected connected component of each project over declared links.
    let mut neighbours: BTreeMap<ProjectId, BTreeSet<ProjectId>> = BTreeMap::new();
    for (&child, parents) in &model.declared {
        neighbours.entry(child).or_default();
        for &parent in parents {
            neighbours.entry(child).or_default().insert(parent);
            neighbours.entry(parent).or_default().insert(child);
        }
    }

    for id in model.live() {
        let mut component = BTreeSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(node) = queue.pop_front() {
            for &next in &neighbours[&node] {
                if component.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        let graph = service.on_user_viewed_graph(id).expect("graph");
        if graph.convergence.is_complete() {
            assert_eq!(
                graph.native_nodes,
                component.iter().copied().collect::<Vec<_>>(),
                "component of {id}"
            );
            assert_eq!(service.remix_count(id).expect("count"), component.len() - 1);
        } else {
            assert!(graph.native_nodes.iter().all(|n| component.contains(n)));
        }
    }
}
