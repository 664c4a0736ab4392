use ash::vk;
use color_eyre::Result;

/// What a component gets to see while the frame's command buffer is recording
#[derive(Debug, Clone, Copy)]
pub struct FrameUpdateData {
    pub frame_index: usize,
    pub command_buffer: vk::CommandBuffer,
    pub pipeline_layout: vk::PipelineLayout,
    pub elapsed_secs: f32,
}

/// A piece of a scene object. Both capabilities are optional.
///
/// `update` is only called while a render pass is being recorded.
pub trait Component {
    fn descriptor_layout(&self) -> Option<vk::DescriptorSetLayout> {
        None
    }

    /// Called with the pipeline-layout set index of the layout returned above
    fn assign_set_index(&mut self, _index: u32) {}

    fn update(&mut self, _data: &FrameUpdateData) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of components. Registration order is dispatch order, and later
/// components may rely on state bound by earlier ones.
#[derive(Default)]
pub struct SceneObject {
    components: Vec<Box<dyn Component>>,
}

impl SceneObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, component: Box<dyn Component>) {
        self.components.push(component);
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Descriptor set layouts in registration order; set `i` of the pipeline layout
    /// is the `i`th contributing component, which is told its index here.
    pub fn collect_layouts(&mut self) -> Vec<vk::DescriptorSetLayout> {
        let mut layouts = Vec::new();
        for component in &mut self.components {
            if let Some(layout) = component.descriptor_layout() {
                component.assign_set_index(layouts.len() as u32);
                layouts.push(layout);
            }
        }
        layouts
    }

    pub fn dispatch_frame(&mut self, data: &FrameUpdateData) -> Result<()> {
        for component in &mut self.components {
            component.update(data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use color_eyre::eyre::eyre;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        layout: Option<vk::DescriptorSetLayout>,
        log: Rc<RefCell<Vec<(&'static str, usize)>>>,
        set_index: Rc<RefCell<Option<u32>>>,
    }

    impl Component for Recorder {
        fn descriptor_layout(&self) -> Option<vk::DescriptorSetLayout> {
            self.layout
        }

        fn assign_set_index(&mut self, index: u32) {
            *self.set_index.borrow_mut() = Some(index);
        }

        fn update(&mut self, data: &FrameUpdateData) -> Result<()> {
            self.log.borrow_mut().push((self.name, data.frame_index));
            Ok(())
        }
    }

    struct Silent;

    impl Component for Silent {}

    struct Failing;

    impl Component for Failing {
        fn update(&mut self, _data: &FrameUpdateData) -> Result<()> {
            Err(eyre!("recording failed"))
        }
    }

    fn frame(frame_index: usize) -> FrameUpdateData {
        FrameUpdateData {
            frame_index,
            command_buffer: vk::CommandBuffer::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            elapsed_secs: 0.0,
        }
    }

    fn recorder(
        name: &'static str,
        layout: Option<u64>,
        log: &Rc<RefCell<Vec<(&'static str, usize)>>>,
    ) -> Box<dyn Component> {
        recorder_with_slot(name, layout, log, &Rc::default())
    }

    fn recorder_with_slot(
        name: &'static str,
        layout: Option<u64>,
        log: &Rc<RefCell<Vec<(&'static str, usize)>>>,
        set_index: &Rc<RefCell<Option<u32>>>,
    ) -> Box<dyn Component> {
        Box::new(Recorder {
            name,
            layout: layout.map(vk::DescriptorSetLayout::from_raw),
            log: log.clone(),
            set_index: set_index.clone(),
        })
    }

    #[test]
    fn test_only_contributing_components_supply_layouts() {
        let log = Rc::default();
        let mut object = SceneObject::new();
        object.add_component(recorder("first", None, &log));
        object.add_component(recorder("second", Some(0x20), &log));

        let layouts = object.collect_layouts();
        assert_eq!(layouts, vec![vk::DescriptorSetLayout::from_raw(0x20)]);
    }

    #[test]
    fn test_layouts_keep_registration_order() {
        let log = Rc::default();
        let mut object = SceneObject::new();
        object.add_component(recorder("transform", Some(0x10), &log));
        object.add_component(Box::new(Silent));
        object.add_component(recorder("texture", Some(0x30), &log));

        assert_eq!(
            object.collect_layouts(),
            vec![
                vk::DescriptorSetLayout::from_raw(0x10),
                vk::DescriptorSetLayout::from_raw(0x30),
            ]
        );
    }

    #[test]
    fn test_set_indices_follow_registration_order() {
        let log = Rc::default();
        let (first, model, second) = (Rc::default(), Rc::default(), Rc::default());
        let mut object = SceneObject::new();
        object.add_component(recorder_with_slot("texture", Some(0x30), &log, &first));
        object.add_component(recorder_with_slot("model", None, &log, &model));
        object.add_component(recorder_with_slot("transform", Some(0x10), &log, &second));

        let layouts = object.collect_layouts();
        assert_eq!(layouts[0], vk::DescriptorSetLayout::from_raw(0x30));
        assert_eq!(*first.borrow(), Some(0));
        assert_eq!(*second.borrow(), Some(1));
        assert_eq!(*model.borrow(), None);
    }

    #[test]
    fn test_dispatch_runs_every_component_in_order() {
        let log = Rc::default();
        let mut object = SceneObject::new();
        object.add_component(recorder("transform", Some(0x10), &log));
        object.add_component(recorder("texture", Some(0x30), &log));
        object.add_component(Box::new(Silent));
        object.add_component(recorder("model", None, &log));

        object.dispatch_frame(&frame(1)).unwrap();
        object.dispatch_frame(&frame(0)).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                ("transform", 1), ("texture", 1), ("model", 1),
                ("transform", 0), ("texture", 0), ("model", 0),
            ]
        );
    }

    #[test]
    fn test_dispatch_stops_at_first_failure() {
        let log = Rc::default();
        let mut object = SceneObject::new();
        object.add_component(recorder("before", None, &log));
        object.add_component(Box::new(Failing));
        object.add_component(recorder("after", None, &log));

        assert!(object.dispatch_frame(&frame(0)).is_err());
        assert_eq!(*log.borrow(), vec![("before", 0)]);
    }

    #[test]
    fn test_empty_object() {
        let mut object = SceneObject::new();
        assert!(object.collect_layouts().is_empty());
        assert!(object.dispatch_frame(&frame(0)).is_ok());
        assert_eq!(object.component_count(), 0);
    }
}
