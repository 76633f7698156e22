//! Whole scripts played back through the scheduler.

use kurbo::Point;
use painter::{
    io::{Mark, Marks, Transcript},
    Config, CurveStrategy, DrawableFrame, Error, Scheduler, Status, Transport,
};
use pretty_assertions::assert_eq;

type Studio = Scheduler<Transcript, Marks>;

fn studio(source: &str) -> Studio {
    studio_with(source, Config::default())
}

fn studio_with(source: &str, config: Config) -> Studio {
    Scheduler::new(source, config, Transcript::default(), Marks::default())
}

/// Plays at 60 frames a second until the script ends.
fn play(s: &mut Studio) -> Result<(), Error> {
    s.play()?;
    for _ in 0..1_000_000 {
        match s.update(16.0)? {
            Status::Finished => return Ok(()),
            Status::Awaiting => s.answer(None),
            Status::Running | Status::Idle => {}
        }
    }
    panic!("script never finished");
}

fn frame_of(source: &str, config: Config) -> DrawableFrame {
    let mut s = studio_with(source, config);
    play(&mut s).unwrap();
    s.state().drawable_frame()
}

#[test]
fn forward_draws_one_stroke() {
    let mut s = studio("forward(100);");
    play(&mut s).unwrap();
    assert_eq!(s.state().position, Point::new(0.0, 100.0));
    let frame = s.state().drawable_frame();
    assert_eq!(frame.segments.len(), 1);
    assert_eq!(frame.segments[0].line.p0, Point::ORIGIN);
    assert_eq!(frame.segments[0].line.p1, Point::new(0.0, 100.0));
    assert_eq!(frame.segments[0].color, "black");
}

#[test]
fn raised_pens_leave_no_trace() {
    let mut s = studio("up(); forward(100); down(); back(50);");
    play(&mut s).unwrap();
    assert_eq!(s.state().position, Point::new(0.0, 50.0));
    assert_eq!(s.state().height, 0.0);
    let frame = s.state().drawable_frame();
    assert_eq!(frame.segments.len(), 1);
    assert_eq!(frame.segments[0].line.p0, Point::new(0.0, 100.0));
}

#[test]
fn colors_stick_to_strokes() {
    let mut s = studio(
        "color = rgb(255, 0, 0); forward(10);\n\
         color = ''; foreground = 'blue'; forward(10);",
    );
    play(&mut s).unwrap();
    let colors: Vec<_> = s
        .state()
        .drawable_frame()
        .segments
        .into_iter()
        .map(|s| s.color)
        .collect();
    assert_eq!(colors, vec!["rgb(255 0 0 / 1)", "blue"]);
}

#[test]
fn color_faults_stop_the_script() {
    let source = "forward(10);\ncolor = rgb(300, 0, 0);\nforward(10);";
    let mut s = studio(source);
    let err = play(&mut s).unwrap_err();
    assert_eq!(err.to_string(), "red should be <= 255 (was 300)");
    assert_eq!(err.span().slice(source), "rgb(300, 0, 0)");
    assert_eq!(s.transport(), Transport::Done);
    assert_eq!(s.state().drawable_frame().segments.len(), 1);
    assert_eq!(
        s.output().errors().collect::<Vec<_>>(),
        vec!["red should be <= 255 (was 300)"]
    );
    assert!(matches!(s.marker().marks[..], [Mark::Error(_)]));
}

#[test]
fn bad_curves_fail_before_moving() {
    let mut s = studio("bezier(10, 90, 10, 90);");
    let err = play(&mut s).unwrap_err();
    assert_eq!(err.to_string(), "segment 3 length unspecified");
    assert_eq!(s.state().position, Point::ORIGIN);
    assert!(s.state().drawable_frame().is_empty());
}

#[test]
fn endless_loops_are_flagged_but_keep_going() {
    let config = Config {
        max_loop_count: 50,
        ..Config::default()
    };
    let mut s = studio_with("var i = 0;\nwhile (true) { i++; }", config);
    s.play().unwrap();
    for _ in 0..100 {
        assert_eq!(s.update(16.0).unwrap(), Status::Running);
    }
    assert_eq!(s.transport(), Transport::Playing);
    assert_eq!(
        s.output().errors().collect::<Vec<_>>(),
        vec!["WARNING: Possible infinite loop!"]
    );
    assert!(matches!(s.marker().marks[..], [Mark::Error(_)]));
}

#[test]
fn loop_warning_counts_quiet_instructions_exactly() {
    let config = Config {
        max_loop_count: 3,
        ..Config::default()
    };
    let warnings = |source: &str| {
        let mut s = studio_with(source, config.clone());
        play(&mut s).unwrap();
        s.output().errors().map(str::to_owned).collect::<Vec<_>>()
    };

    // Each `var` is one instruction with nothing to animate, and `up()` animates.
    let three = "var a = 1;\nvar b = 2;\nvar c = 3;\nup();";
    assert_eq!(warnings(three), Vec::<String>::new());
    let four = "var a = 1;\nvar b = 2;\nvar c = 3;\nvar d = 4;\nup();";
    assert_eq!(warnings(four), vec!["WARNING: Possible infinite loop!"]);

    // Animating starts the count over.
    let split = "var a = 1;\nvar b = 2;\nvar c = 3;\nup();\nvar d = 4;\nvar e = 5;\nvar f = 6;\ndown();";
    assert_eq!(warnings(split), Vec::<String>::new());
}

#[test]
fn long_loops_eventually_finish() {
    let config = Config {
        max_loop_count: 50,
        ..Config::default()
    };
    let mut s = studio_with("var i = 0;\nwhile (i < 200) { i++; }\nforward(10);", config);
    play(&mut s).unwrap();
    assert_eq!(s.state().drawable_frame().segments.len(), 1);
}

#[test]
fn output_arrives_in_order() {
    let mut s = studio("print('a', 1); forward(1); println('b', 'c'); print(2 + 2);");
    play(&mut s).unwrap();
    assert_eq!(
        s.output().infos().collect::<Vec<_>>(),
        vec!["a 1", "b\nc\n", "4"]
    );
}

#[test]
fn runs_are_repeatable() {
    let source = "\
        for (var i = 0; i < 5; i++) {\n\
            forward(random(10, 50));\n\
            bezier(20, random(0, 90), 20, random(-45, 45), 10);\n\
            left(random(360));\n\
        }";
    let config = Config {
        seed: 7,
        ..Config::default()
    };
    let first = frame_of(source, config.clone());
    assert!(!first.is_empty());
    assert_eq!(frame_of(source, config.clone()), first);

    // Replaying reuses the parsed script and reseeds its random numbers.
    let mut s = studio_with(source, config.clone());
    play(&mut s).unwrap();
    play(&mut s).unwrap();
    assert_eq!(s.state().drawable_frame(), first);
    s.stop();
    play(&mut s).unwrap();
    assert_eq!(s.state().drawable_frame(), first);

    let with_worker = Config {
        curve_strategy: CurveStrategy::Worker,
        ..config
    };
    assert_eq!(frame_of(source, with_worker), first);
}

#[test]
fn fast_forward_gets_there_sooner() {
    let mut s = studio("forward(100); right(90); forward(100);");
    s.fast_forward().unwrap();
    let mut frames = 0;
    while s.update(16.0).unwrap() != Status::Finished {
        frames += 1;
    }
    assert!(frames < 3, "took {frames} frames");
    assert!(s.state().position.distance(Point::new(100.0, 100.0)) < 1e-6);
}

#[test]
fn speed_changes_playback() {
    // A new speed takes effect from the next frame.
    let progress = |source: &str| {
        let mut s = studio(source);
        s.play().unwrap();
        s.update(16.0).unwrap();
        let before = s.state().position.y;
        s.update(16.0).unwrap();
        s.state().position.y - before
    };
    let slow = progress("speed = 50; forward(100);");
    let normal = progress("forward(100);");
    assert!((normal - 2.0 * slow).abs() < 1e-9, "{normal} vs {slow}");
}

#[test]
fn transport_controls() {
    let mut s = studio("forward(10); forward(10); forward(10);");
    assert_eq!(s.transport(), Transport::Ready);
    assert_eq!(s.update(16.0).unwrap(), Status::Idle);

    s.step().unwrap();
    assert_eq!(s.state().position, Point::new(0.0, 10.0));
    s.play().unwrap();
    assert_eq!(s.transport(), Transport::Playing);
    s.update(16.0).unwrap();
    s.pause();
    assert_eq!(s.transport(), Transport::Paused);
    let y = s.state().position.y;
    assert!(y > 10.0 && y < 20.0);

    // Stepping from a pause finishes the move in progress.
    s.step().unwrap();
    assert_eq!(s.state().position, Point::new(0.0, 20.0));

    s.stop();
    assert_eq!(s.transport(), Transport::Ready);
    assert_eq!(s.state().position, Point::ORIGIN);
    assert!(s.state().drawable_frame().is_empty());
}

#[test]
fn tracing_marks_each_instruction() {
    let config = Config {
        trace: true,
        ..Config::default()
    };
    let source = "var a = 1;\nforward(a);";
    let mut s = studio_with(source, config);
    s.play().unwrap();
    let mut marked = Vec::new();
    loop {
        let status = s.update(16.0).unwrap();
        if let [Mark::Instruction(span)] = s.marker().marks[..] {
            let text = span.slice(source);
            if marked.last() != Some(&text) {
                marked.push(text);
            }
        }
        if status == Status::Finished {
            break;
        }
    }
    assert_eq!(marked.first(), Some(&"var a = 1;"));
    assert!(marked.contains(&"forward(a);"));
    assert_eq!(s.state().position, Point::new(0.0, 1.0));
}

#[test]
fn questions_are_answered_in_the_scripts_types() {
    let mut s = studio(
        "var n = ask('how far?', 10);\n\
         var name = ask('name?', 'turtle');\n\
         forward(n);\n\
         print(name, typeof n);",
    );
    s.play().unwrap();
    assert_eq!(s.update(16.0).unwrap(), Status::Awaiting);
    assert_eq!(s.question().unwrap().question, "how far?");
    s.answer(Some("25"));

    assert_eq!(s.update(16.0).unwrap(), Status::Awaiting);
    assert_eq!(s.question().unwrap().question, "name?");
    s.answer(None);

    play_on(&mut s);
    assert_eq!(s.state().position, Point::new(0.0, 25.0));
    assert_eq!(s.output().infos().collect::<Vec<_>>(), vec!["turtle number"]);
}

fn play_on(s: &mut Studio) {
    while s.update(16.0).unwrap() != Status::Finished {}
}

#[test]
fn parse_faults_name_the_token() {
    let mut s = studio("forward(10) left(90);");
    let err = play(&mut s).unwrap_err();
    let Error::Parse(fault) = err else {
        panic!("expected a parse fault, got {err:?}");
    };
    assert_eq!(fault.line, 1);
    assert_eq!(fault.token, "left");
    assert_eq!(s.transport(), Transport::Done);
    assert!(s.state().drawable_frame().is_empty());
}
