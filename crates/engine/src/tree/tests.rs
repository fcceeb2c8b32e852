#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, Weak};

    use treeflow_core::{EngineConfig, OpState, PrepareFlags, TreeError, TreeResult, TreeState};

    use crate::node::{DatasetOp, OpKind, OpNode};
    use crate::ops::{CacheOp, MapOp, RepeatOp, ShuffleOp, SourceOp};
    use crate::pass::Pass;
    use crate::sampler::Sampler;
    use crate::task::{TaskContext, TaskFn, TaskGroup, PARALLEL_WORKER_LABEL};
    use crate::tree::{op_task_label, ExecutionTree, MONITOR_TASK_LABEL};

    type EventLog = Arc<Mutex<Vec<(String, PrepareFlags)>>>;

    /// Mock operator recording the flags seen by its prepare hooks.
    struct MockOp {
        name: String,
        inlined: bool,
        flags: PrepareFlags,
        fail_pre: bool,
        log: EventLog,
    }

    impl MockOp {
        fn new(name: &str, log: &EventLog) -> Self {
            Self {
                name: name.to_string(),
                inlined: false,
                flags: PrepareFlags::NONE,
                fail_pre: false,
                log: Arc::clone(log),
            }
        }

        fn as_inlined(mut self) -> Self {
            self.inlined = true;
            self
        }

        fn with_flags(mut self, flags: PrepareFlags) -> Self {
            self.flags = flags;
            self
        }

        fn failing(mut self) -> Self {
            self.fail_pre = true;
            self
        }
    }

    impl DatasetOp for MockOp {
        fn name(&self) -> &str { &self.name }
        fn kind(&self) -> OpKind { OpKind::Other }
        fn inlined(&self) -> bool { self.inlined }
        fn prepare_flags(&self) -> PrepareFlags { self.flags }

        fn prepare_node_pre_action(&self, node: &Arc<OpNode>, tree: &mut ExecutionTree) -> TreeResult<()> {
            self.log.lock().unwrap().push((format!("pre:{}", self.name), tree.prepare_flags()));
            if self.fail_pre {
                return Err(TreeError::HookFailure {
                    op_id: node.id(),
                    op_name: self.name.clone(),
                    hook: "prepare pre-action",
                    reason: "mock failure".into(),
                });
            }
            Ok(())
        }

        fn prepare_node_post_action(&self, _node: &Arc<OpNode>, tree: &mut ExecutionTree) -> TreeResult<()> {
            self.log.lock().unwrap().push((format!("post:{}", self.name), tree.prepare_flags()));
            Ok(())
        }

        fn run(&self, _node: &Arc<OpNode>, _ctx: &TaskContext) -> TreeResult<()> { Ok(()) }
        fn as_any(&self) -> &dyn Any { self }
    }

    /// Task group that records spawn labels and can reject the Nth spawn.
    /// With `run_inline`, accepted tasks run on the caller's thread.
    struct RecordingGroup {
        me: Weak<RecordingGroup>,
        labels: Mutex<Vec<String>>,
        attempts: Mutex<usize>,
        reject_at: Option<usize>,
        run_inline: bool,
        interrupt: Arc<AtomicBool>,
    }

    impl RecordingGroup {
        fn new(reject_at: Option<usize>, run_inline: bool) -> Arc<Self> {
            Arc::new_cyclic(|me| Self {
                me: me.clone(),
                labels: Mutex::new(Vec::new()),
                attempts: Mutex::new(0),
                reject_at,
                run_inline,
                interrupt: Arc::new(AtomicBool::new(false)),
            })
        }

        fn labels(&self) -> Vec<String> {
            self.labels.lock().unwrap().clone()
        }
    }

    impl TaskGroup for RecordingGroup {
        fn create_async_task(&self, label: &str, task: TaskFn) -> TreeResult<()> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                let n = *attempts;
                *attempts += 1;
                n
            };
            if self.reject_at == Some(attempt) {
                return Err(TreeError::spawn_failure(label, "rejected by test group"));
            }
            self.labels.lock().unwrap().push(label.to_string());
            if self.run_inline {
                let group: Arc<dyn TaskGroup> = self.me.upgrade().expect("group alive");
                let ctx = TaskContext::new(label, Arc::clone(&self.interrupt), group);
                task(&ctx)?;
            }
            Ok(())
        }

        fn join_all(&self) -> TreeResult<()> { Ok(()) }

        fn service_stop(&self) -> TreeResult<()> {
            self.interrupt.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn new_log() -> EventLog {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn mock(name: &str, log: &EventLog) -> Arc<OpNode> {
        OpNode::new(MockOp::new(name, log))
    }

    fn recording_tree(group: &Arc<RecordingGroup>) -> ExecutionTree {
        let group: Arc<dyn TaskGroup> = Arc::clone(group) as Arc<dyn TaskGroup>;
        ExecutionTree::with_task_group(EngineConfig::default(), group)
    }

    /// R -> [A -> [C], B], associated in the order R, A, B, C.
    fn sample_tree(tree: &mut ExecutionTree, log: &EventLog) -> [Arc<OpNode>; 4] {
        let r = mock("R", log);
        let a = mock("A", log);
        let b = mock("B", log);
        let c = mock("C", log);
        for n in [&r, &a, &b, &c] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&r, &a).unwrap();
        tree.add_child(&r, &b).unwrap();
        tree.add_child(&a, &c).unwrap();
        tree.assign_root(&r).unwrap();
        [r, a, b, c]
    }

    fn names(nodes: impl Iterator<Item = Arc<OpNode>>) -> Vec<String> {
        nodes.map(|n| n.name().to_string()).collect()
    }

    // ── Association ──────────────────────────────────────────────

    #[test]
    fn ids_increase_from_zero() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        assert_eq!(tree.state(), TreeState::Init);

        let nodes: Vec<_> = (0..5).map(|i| mock(&format!("n{i}"), &log)).collect();
        for node in &nodes {
            tree.associate_node(node).unwrap();
        }

        let ids: Vec<_> = nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.state(), TreeState::Building);
        assert!(nodes.iter().all(|n| tree.owns(n)));
    }

    #[test]
    fn associate_twice_is_idempotent() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let a = mock("A", &log);
        let b = mock("B", &log);

        tree.associate_node(&a).unwrap();
        tree.associate_node(&a).unwrap();
        tree.associate_node(&b).unwrap();

        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn node_cannot_join_a_second_tree() {
        let log = new_log();
        let mut first = ExecutionTree::new();
        let mut second = ExecutionTree::new();
        let a = mock("A", &log);

        first.associate_node(&a).unwrap();
        let err = second.associate_node(&a).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert_eq!(second.node_count(), 0);
        assert_eq!(second.state(), TreeState::Init);
    }

    #[test]
    fn associate_after_prepare_is_rejected() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        sample_tree(&mut tree, &log);
        tree.prepare().unwrap();

        let late = mock("late", &log);
        let err = tree.associate_node(&late).unwrap_err();
        assert!(matches!(
            err,
            TreeError::InvalidState { current: TreeState::Ready, .. }
        ));
        assert_eq!(tree.node_count(), 4);
    }

    // ── Root assignment ──────────────────────────────────────────

    #[test]
    fn assign_root_rejected_in_init() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = mock("R", &log);
        let err = tree.assign_root(&r).unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Init, .. }));
        assert!(tree.root().is_none());
    }

    #[test]
    fn assign_root_rejected_in_prepare() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = OpNode::new(MockOp::new("R", &log).failing());
        tree.assign_root(&r).unwrap_err();
        tree.associate_node(&r).unwrap();
        tree.assign_root(&r).unwrap();

        // The failing hook stops the tree in Prepare.
        tree.prepare().unwrap_err();
        assert_eq!(tree.state(), TreeState::Prepare);

        let err = tree.assign_root(&r).unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Prepare, .. }));
    }

    #[test]
    fn assign_root_rejected_in_ready_and_executing() {
        let log = new_log();
        let group = RecordingGroup::new(None, false);
        let mut tree = recording_tree(&group);
        let [r, ..] = sample_tree(&mut tree, &log);
        tree.prepare().unwrap();

        let err = tree.assign_root(&r).unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Ready, .. }));

        tree.launch().unwrap();
        let err = tree.assign_root(&r).unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Executing, .. }));
    }

    #[test]
    fn assign_root_associates_unowned_node() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let a = mock("A", &log);
        let r = mock("R", &log);
        tree.associate_node(&a).unwrap();
        tree.assign_root(&r).unwrap();
        assert_eq!(r.id(), 1);
        assert!(Arc::ptr_eq(tree.root().unwrap(), &r));
    }

    #[test]
    fn assign_root_rejects_node_of_another_tree() {
        let log = new_log();
        let mut other = ExecutionTree::new();
        let foreign = mock("Foreign", &log);
        other.associate_node(&foreign).unwrap();

        let mut tree = ExecutionTree::new();
        tree.associate_node(&mock("A", &log)).unwrap();
        let err = tree.assign_root(&foreign).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert!(tree.root().is_none());

        assert!(tree.prepare().is_err());
        assert_ne!(tree.state(), TreeState::Ready);
        assert!(log.lock().unwrap().is_empty());
    }

    // ── Traversal and printing ───────────────────────────────────

    #[test]
    fn postorder_visits_children_first() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [_, a, ..] = sample_tree(&mut tree, &log);

        assert_eq!(names(tree.iter()), vec!["C", "A", "B", "R"]);
        assert_eq!(tree.iter().len(), 4);
        assert_eq!(names(tree.iter_from(&a)), vec!["C", "A"]);
    }

    #[test]
    fn empty_tree_iterates_nothing() {
        let tree = ExecutionTree::new();
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.to_string(), "Execution tree is empty\n");
    }

    #[test]
    fn summary_draws_outline() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        sample_tree(&mut tree, &log);

        let expected = "\
+- (0) <R>: [workers: 1]
    +- (1) <A>: [workers: 1]
    |   +- (3) <C>: [workers: 1]
    +- (2) <B>: [workers: 1]
";
        assert_eq!(tree.summary(), expected);
    }

    #[test]
    fn print_appends_operator_details() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [_, a, ..] = sample_tree(&mut tree, &log);

        let mut out = String::new();
        tree.print(&mut out, Some(&a)).unwrap();
        assert!(out.starts_with("Execution tree summary:"));
        assert!(out.contains("Execution tree operator details:"));
        assert!(out.contains("Operator: (1) <A>"));
        assert!(out.contains("Operator: (3) <C>"));
        assert!(!out.contains("<R>"));
    }

    // ── Prepare ──────────────────────────────────────────────────

    #[test]
    fn prepare_reaches_ready_and_visits_hooks_in_order() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        sample_tree(&mut tree, &log);
        tree.prepare().unwrap();

        assert_eq!(tree.state(), TreeState::Ready);
        let events: Vec<_> = log.lock().unwrap().iter().map(|(e, _)| e.clone()).collect();
        assert_eq!(
            events,
            vec!["pre:R", "pre:A", "pre:C", "post:C", "post:A", "pre:B", "post:B", "post:R"]
        );
    }

    #[test]
    fn prepare_requires_building() {
        let mut tree = ExecutionTree::new();
        let err = tree.prepare().unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Init, .. }));
    }

    #[test]
    fn prepare_without_root_fails() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        tree.associate_node(&mock("A", &log)).unwrap();

        let err = tree.prepare().unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert_eq!(tree.state(), TreeState::Prepare);
    }

    #[test]
    fn nested_flag_survives_child_exit() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let x = OpNode::new(MockOp::new("X", &log).with_flags(PrepareFlags::REPEAT));
        let y = OpNode::new(MockOp::new("Y", &log).with_flags(PrepareFlags::REPEAT));
        let w = mock("W", &log);
        for n in [&x, &y, &w] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&x, &y).unwrap();
        tree.add_child(&x, &w).unwrap();
        tree.assign_root(&x).unwrap();
        tree.prepare().unwrap();

        let log = log.lock().unwrap();
        let flags_at = |event: &str| {
            log.iter()
                .find(|(e, _)| e == event)
                .map(|(_, f)| *f)
                .unwrap()
        };
        assert_eq!(flags_at("pre:X"), PrepareFlags::NONE);
        assert_eq!(flags_at("pre:Y"), PrepareFlags::REPEAT);
        // Y cleared its own contribution only.
        assert_eq!(flags_at("pre:W"), PrepareFlags::REPEAT);
        assert_eq!(flags_at("post:X"), PrepareFlags::REPEAT);
        assert!(tree.prepare_flags().is_empty());
    }

    #[test]
    fn flags_do_not_leak_to_siblings() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = mock("R", &log);
        let cached = OpNode::new(MockOp::new("Cached", &log).with_flags(PrepareFlags::CACHE));
        let sibling = mock("Sibling", &log);
        for n in [&r, &cached, &sibling] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&r, &cached).unwrap();
        tree.add_child(&r, &sibling).unwrap();
        tree.assign_root(&r).unwrap();
        tree.prepare().unwrap();

        let log = log.lock().unwrap();
        let (_, flags) = log.iter().find(|(e, _)| e == "pre:Sibling").unwrap();
        assert!(flags.is_empty());
    }

    struct FailingPass;

    impl Pass for FailingPass {
        fn name(&self) -> &str { "FailingPass" }

        fn run(&self, _tree: &mut ExecutionTree, _modified: &mut bool) -> TreeResult<()> {
            Err(TreeError::pass_failure("FailingPass", "boom"))
        }
    }

    struct FlagPass(Arc<AtomicBool>);

    impl Pass for FlagPass {
        fn name(&self) -> &str { "FlagPass" }

        fn run(&self, _tree: &mut ExecutionTree, _modified: &mut bool) -> TreeResult<()> {
            self.0.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn failing_pre_pass_stops_prepare() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        sample_tree(&mut tree, &log);
        let optimized = Arc::new(AtomicBool::new(false));
        tree.set_pre_passes(vec![Box::new(FailingPass)]);
        tree.add_optimization_pass(Box::new(FlagPass(Arc::clone(&optimized))));

        let err = tree.prepare().unwrap_err();
        match err {
            TreeError::PassFailure { pass, reason } => {
                assert_eq!(pass, "FailingPass");
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!optimized.load(Ordering::Relaxed));
        assert_eq!(tree.state(), TreeState::Building);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn optimization_passes_run_after_pre_passes() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        sample_tree(&mut tree, &log);
        let optimized = Arc::new(AtomicBool::new(false));
        tree.add_optimization_pass(Box::new(FlagPass(Arc::clone(&optimized))));

        tree.prepare().unwrap();
        assert!(optimized.load(Ordering::Relaxed));
    }

    // ── Reference operators during prepare ───────────────────────

    #[test]
    fn shuffle_below_cache_is_removed() {
        let mut tree = ExecutionTree::new();
        let cache = OpNode::new(CacheOp::new());
        let shuffle = OpNode::new(ShuffleOp::new(64, 1));
        let source = OpNode::new(SourceOp::new(10));
        for n in [&cache, &shuffle, &source] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&cache, &shuffle).unwrap();
        tree.add_child(&shuffle, &source).unwrap();
        tree.assign_root(&cache).unwrap();
        tree.prepare().unwrap();

        assert_eq!(names(tree.iter()), vec!["SourceOp", "CacheOp"]);
        assert!(Arc::ptr_eq(&source.parent().unwrap(), &cache));
        assert!(shuffle.parent().is_none());

        // The leaf handed its sampler up to the cache.
        assert!(cache.op_as::<CacheOp>().unwrap().sampler().is_some());
        assert!(source.op_as::<SourceOp>().unwrap().sampler().is_none());
    }

    #[test]
    fn shuffle_outside_cache_is_kept() {
        let mut tree = ExecutionTree::new();
        let shuffle = OpNode::new(ShuffleOp::new(64, 1));
        let source = OpNode::new(SourceOp::new(10));
        tree.associate_node(&shuffle).unwrap();
        tree.associate_node(&source).unwrap();
        tree.add_child(&shuffle, &source).unwrap();
        tree.assign_root(&shuffle).unwrap();
        tree.prepare().unwrap();

        assert_eq!(names(tree.iter()), vec!["SourceOp", "ShuffleOp"]);
        assert!(source.op_as::<SourceOp>().unwrap().sampler().is_some());
    }

    #[test]
    fn repeat_collects_end_of_epoch_operators() {
        let mut tree = ExecutionTree::new();
        let outer = OpNode::new(RepeatOp::new(2));
        let inner = OpNode::new(RepeatOp::new(3));
        let map = OpNode::new(MapOp::new(2));
        let source = OpNode::new(SourceOp::new(10));
        for n in [&outer, &inner, &map, &source] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&outer, &inner).unwrap();
        tree.add_child(&inner, &map).unwrap();
        tree.add_child(&map, &source).unwrap();
        tree.assign_root(&outer).unwrap();
        tree.prepare().unwrap();

        assert_eq!(inner.op_as::<RepeatOp>().unwrap().eoe_op_ids(), vec![source.id()]);
        assert_eq!(outer.op_as::<RepeatOp>().unwrap().eoe_op_ids(), vec![inner.id()]);
        assert!(tree.pop_from_eoe_op_stack().is_none());
    }

    #[test]
    fn cache_without_sampling_leaf_fails() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let cache = OpNode::new(CacheOp::new());
        let leaf = mock("Leaf", &log);
        tree.associate_node(&cache).unwrap();
        tree.associate_node(&leaf).unwrap();
        tree.add_child(&cache, &leaf).unwrap();
        tree.assign_root(&cache).unwrap();

        let err = tree.prepare().unwrap_err();
        assert!(
            matches!(err, TreeError::HookFailure { op_id: 0, hook: "prepare post-action", .. }),
            "got {err:?}"
        );
        assert_eq!(tree.state(), TreeState::Prepare);
    }

    #[test]
    fn invalid_repeat_count_fails_pre_action() {
        let mut tree = ExecutionTree::new();
        let repeat = OpNode::new(RepeatOp::new(0));
        let source = OpNode::new(SourceOp::new(1));
        tree.associate_node(&repeat).unwrap();
        tree.associate_node(&source).unwrap();
        tree.add_child(&repeat, &source).unwrap();
        tree.assign_root(&repeat).unwrap();

        let err = tree.prepare().unwrap_err();
        assert!(matches!(err, TreeError::HookFailure { hook: "prepare pre-action", .. }));
    }

    #[test]
    fn stacks_pop_none_when_empty() {
        let mut tree = ExecutionTree::new();
        assert!(tree.pop_from_eoe_op_stack().is_none());
        assert!(tree.pop_from_sampler_stack().is_none());
    }

    #[test]
    fn eoe_stack_pops_last_pushed_first() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let a = mock("A", &log);
        let b = mock("B", &log);

        tree.add_to_eoe_op_stack(Arc::clone(&a));
        tree.add_to_eoe_op_stack(Arc::clone(&b));
        assert!(Arc::ptr_eq(&tree.pop_from_eoe_op_stack().unwrap(), &b));
        assert!(Arc::ptr_eq(&tree.pop_from_eoe_op_stack().unwrap(), &a));
        assert!(tree.pop_from_eoe_op_stack().is_none());
    }

    #[test]
    fn sampler_stack_pops_last_pushed_first() {
        let mut tree = ExecutionTree::new();
        let sequential = Sampler::default();
        let sharded = Sampler::Distributed { num_shards: 4, shard_id: 1 };

        tree.add_to_sampler_stack(Arc::new(sequential.clone()));
        tree.add_to_sampler_stack(Arc::new(sharded.clone()));
        assert_eq!(*tree.pop_from_sampler_stack().unwrap(), sharded);
        assert_eq!(*tree.pop_from_sampler_stack().unwrap(), sequential);
        assert!(tree.pop_from_sampler_stack().is_none());
    }

    // ── Structure edits ──────────────────────────────────────────

    #[test]
    fn add_child_requires_ownership_and_single_parent() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [r, a, ..] = sample_tree(&mut tree, &log);

        let stranger = mock("Stranger", &log);
        assert!(matches!(tree.add_child(&r, &stranger), Err(TreeError::Association(_))));
        assert!(matches!(tree.add_child(&r, &r), Err(TreeError::Association(_))));
        assert!(matches!(tree.add_child(&r, &a), Err(TreeError::Association(_))));
    }

    #[test]
    fn add_child_rejects_root_under_descendant() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = mock("R", &log);
        let a = mock("A", &log);
        tree.associate_node(&r).unwrap();
        tree.associate_node(&a).unwrap();
        tree.add_child(&r, &a).unwrap();
        tree.assign_root(&r).unwrap();

        let err = tree.add_child(&a, &r).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert!(r.parent().is_none());
        assert_eq!(a.child_count(), 0);
        assert_eq!(names(tree.iter()), vec!["A", "R"]);
    }

    #[test]
    fn add_child_rejects_cycle_in_detached_subtree() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [_, _, _, c] = sample_tree(&mut tree, &log);
        let x = mock("X", &log);
        let y = mock("Y", &log);
        let z = mock("Z", &log);
        for n in [&x, &y, &z] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&x, &y).unwrap();
        tree.add_child(&y, &z).unwrap();

        let err = tree.add_child(&z, &x).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert!(x.parent().is_none());
        assert_eq!(z.child_count(), 0);

        // The detached subtree can still be attached below the tree.
        tree.add_child(&c, &x).unwrap();
        assert_eq!(names(tree.iter()), vec!["Z", "Y", "X", "C", "A", "B", "R"]);
    }

    #[test]
    fn remove_root_promotes_its_child() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = mock("R", &log);
        let c = mock("C", &log);
        tree.associate_node(&r).unwrap();
        tree.associate_node(&c).unwrap();
        tree.add_child(&r, &c).unwrap();
        tree.assign_root(&r).unwrap();

        tree.remove_node(&r).unwrap();
        assert!(Arc::ptr_eq(tree.root().unwrap(), &c));
        assert!(c.parent().is_none());
        assert_eq!(r.child_count(), 0);
    }

    #[test]
    fn remove_node_with_two_children_fails() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [r, ..] = sample_tree(&mut tree, &log);
        assert!(matches!(tree.remove_node(&r), Err(TreeError::Association(_))));
        assert_eq!(r.child_count(), 2);
    }

    #[test]
    fn insert_as_parent_splices_between() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [r, a, ..] = sample_tree(&mut tree, &log);
        let mid = mock("Mid", &log);

        tree.insert_as_parent(&a, &mid).unwrap();
        assert_eq!(mid.id(), 4);
        assert!(Arc::ptr_eq(&r.child(0).unwrap(), &mid));
        assert!(Arc::ptr_eq(&a.parent().unwrap(), &mid));
        assert_eq!(names(tree.iter()), vec!["C", "A", "Mid", "B", "R"]);
    }

    #[test]
    fn insert_as_parent_rejects_self() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let r = mock("R", &log);
        tree.associate_node(&r).unwrap();
        tree.assign_root(&r).unwrap();

        let err = tree.insert_as_parent(&r, &r).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert_eq!(r.child_count(), 0);
        assert!(r.parent().is_none());
        assert_eq!(names(tree.iter()), vec!["R"]);
    }

    #[test]
    fn insert_as_parent_rejects_unlisted_child() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [r, ..] = sample_tree(&mut tree, &log);
        let dangling = mock("Dangling", &log);
        let mid = mock("Mid", &log);
        tree.associate_node(&dangling).unwrap();
        tree.associate_node(&mid).unwrap();
        // Parent link without a matching entry in the parent's child list.
        dangling.set_parent(Some(&r));

        let err = tree.insert_as_parent(&dangling, &mid).unwrap_err();
        assert!(matches!(err, TreeError::Association(_)), "got {err:?}");
        assert!(mid.parent().is_none());
        assert_eq!(mid.child_count(), 0);
        assert_eq!(r.child_count(), 2);
        assert!(r.children().iter().all(|c| !Arc::ptr_eq(c, &mid)));
    }

    #[test]
    fn structure_is_frozen_once_ready() {
        let log = new_log();
        let mut tree = ExecutionTree::new();
        let [_, a, ..] = sample_tree(&mut tree, &log);
        tree.prepare().unwrap();

        let err = tree.remove_node(&a).unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Ready, .. }));
    }

    // ── Launch ───────────────────────────────────────────────────

    /// R -> I (inlined) -> L, two non-inlined nodes around an inlined one.
    fn three_level_tree(tree: &mut ExecutionTree, log: &EventLog) -> [Arc<OpNode>; 3] {
        let r = mock("R", log);
        let i = OpNode::new(MockOp::new("I", log).as_inlined());
        let l = mock("L", log);
        for n in [&r, &i, &l] {
            tree.associate_node(n).unwrap();
        }
        tree.add_child(&r, &i).unwrap();
        tree.add_child(&i, &l).unwrap();
        tree.assign_root(&r).unwrap();
        [r, i, l]
    }

    #[test]
    fn launch_spawns_one_task_per_non_inlined_node() {
        let log = new_log();
        let group = RecordingGroup::new(None, false);
        let mut tree = recording_tree(&group);
        let [r, i, l] = three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();
        tree.launch().unwrap();

        assert_eq!(group.labels(), vec![op_task_label(l.id()), op_task_label(r.id())]);
        assert_eq!(tree.state(), TreeState::Executing);
        for node in [&r, &i, &l] {
            assert_eq!(node.state(), OpState::Running);
        }
    }

    #[test]
    fn second_launch_is_rejected_without_spawning() {
        let log = new_log();
        let group = RecordingGroup::new(None, false);
        let mut tree = recording_tree(&group);
        three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();
        tree.launch().unwrap();

        let err = tree.launch().unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Executing, .. }));
        assert_eq!(group.labels().len(), 2);
    }

    fn profiled_recording_tree(group: &Arc<RecordingGroup>, output_dir: std::path::PathBuf) -> ExecutionTree {
        let mut config = EngineConfig::default();
        config.profiling.enabled = true;
        config.profiling.output_dir = output_dir;
        let group: Arc<dyn TaskGroup> = Arc::clone(group) as Arc<dyn TaskGroup>;
        ExecutionTree::with_task_group(config, group)
    }

    #[test]
    fn profiled_launch_spawns_monitor_before_operators() {
        let log = new_log();
        let dir = std::env::temp_dir().join(format!("treeflow-monitor-{}", uuid::Uuid::new_v4()));
        let group = RecordingGroup::new(None, false);
        let mut tree = profiled_recording_tree(&group, dir.clone());
        let [r, _, l] = three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();
        tree.launch().unwrap();

        assert!(tree.profiling().is_initialized());
        assert!(dir.is_dir());
        assert_eq!(
            group.labels(),
            vec![MONITOR_TASK_LABEL.to_string(), op_task_label(l.id()), op_task_label(r.id())]
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn profiling_setup_failure_aborts_launch() {
        let log = new_log();
        let blocker = std::env::temp_dir().join(format!("treeflow-blocker-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();
        let group = RecordingGroup::new(None, false);
        let mut tree = profiled_recording_tree(&group, blocker.clone());
        let [r, i, l] = three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();

        let err = tree.launch().unwrap_err();
        assert!(matches!(err, TreeError::Io(_)), "got {err:?}");
        assert_eq!(tree.state(), TreeState::Ready);
        assert!(group.labels().is_empty());
        assert!(!tree.profiling().is_initialized());
        for node in [&r, &i, &l] {
            assert_eq!(node.state(), OpState::Idle);
        }
        std::fs::remove_file(&blocker).unwrap();
    }

    #[test]
    fn launch_before_prepare_is_rejected() {
        let log = new_log();
        let group = RecordingGroup::new(None, false);
        let mut tree = recording_tree(&group);
        three_level_tree(&mut tree, &log);

        let err = tree.launch().unwrap_err();
        assert!(matches!(err, TreeError::InvalidState { current: TreeState::Building, .. }));
        assert!(group.labels().is_empty());
    }

    #[test]
    fn rejected_operator_spawn_surfaces() {
        let log = new_log();
        let group = RecordingGroup::new(Some(0), false);
        let mut tree = recording_tree(&group);
        three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();

        let err = tree.launch().unwrap_err();
        assert!(matches!(err, TreeError::SpawnFailure { .. }));
        assert_eq!(tree.state(), TreeState::Ready);
    }

    #[test]
    fn launched_operator_terminates_after_run() {
        let log = new_log();
        let group = RecordingGroup::new(None, true);
        let mut tree = recording_tree(&group);
        let [r, i, l] = three_level_tree(&mut tree, &log);
        tree.prepare().unwrap();
        tree.launch().unwrap();

        assert_eq!(r.state(), OpState::Terminated);
        assert_eq!(l.state(), OpState::Terminated);
        // Inlined nodes have no task of their own.
        assert_eq!(i.state(), OpState::Running);
    }

    #[test]
    fn launch_workers_runs_each_index_in_order() {
        let group = RecordingGroup::new(None, true);
        let tree = recording_tree(&group);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        tree.launch_workers(3, move |worker_id, _ctx: &TaskContext| {
            sink.lock().unwrap().push(worker_id);
            Ok(())
        })
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(group.labels(), vec![PARALLEL_WORKER_LABEL; 3]);
    }

    #[test]
    fn launch_workers_aborts_on_rejected_spawn() {
        let group = RecordingGroup::new(Some(1), true);
        let tree = recording_tree(&group);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let err = tree
            .launch_workers(3, move |worker_id, _ctx: &TaskContext| {
                sink.lock().unwrap().push(worker_id);
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, TreeError::SpawnFailure { .. }));
        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(*group.attempts.lock().unwrap(), 2);
    }
}
